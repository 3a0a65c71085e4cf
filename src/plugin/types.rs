//! Plugin type definitions
//!
//! This module defines the identity of a plugin (its type and composite key),
//! the opaque instance a plugin produces, the closed set of capabilities the
//! host knows how to wire, and the metadata a plugin exports during init.

use axum::Router;
use serde::{Deserialize, Serialize, Serializer};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Type of the built-in directory-backed filesystem plugins
pub const STORAGE_FS: &str = "storage.fs";

/// Serving category: instances of this type may be attached to the HTTP server
pub const HTTP_HANDLER: &str = "http.handler";

/// Capability category a plugin provides, e.g. `storage.fs`
///
/// Several registrations may share a type; dependencies are declared
/// against types, not against individual plugins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginType(String);

impl PluginType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PluginType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Composite `(type, id)` key addressing exactly one registration
///
/// Renders as `type/id`. Ordering is by type, then id, which is the
/// tie-break order used during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    plugin_type: PluginType,
    id: String,
}

impl PluginKey {
    pub fn new(plugin_type: impl Into<PluginType>, id: impl Into<String>) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            id: id.into(),
        }
    }

    /// Parse a `type/id` string; the id is everything after the last `/`
    pub fn parse(s: &str) -> Option<Self> {
        let (plugin_type, id) = s.rsplit_once('/')?;
        if plugin_type.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(plugin_type, id))
    }

    pub fn plugin_type(&self) -> &PluginType {
        &self.plugin_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin_type, self.id)
    }
}

impl Serialize for PluginKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Behavior an instance exposes to the host, beyond being an opaque value
///
/// This is the closed set of capabilities the driver recognizes.
#[derive(Clone)]
pub enum Capability {
    /// Serves HTTP requests; attached to the server's root route
    RequestHandler(Router),
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::RequestHandler(_) => "request-handler",
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The value a plugin's init produces
///
/// Cheap to clone; every clone refers to the same underlying value.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    capability: Option<Capability>,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            capability: None,
        }
    }

    /// An instance carrying the request-handler capability
    pub fn request_handler(router: Router) -> Self {
        Self {
            value: Arc::new(router.clone()),
            type_name: std::any::type_name::<Router>(),
            capability: Some(Capability::RequestHandler(router)),
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Name of the concrete type the instance was built from
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn capability(&self) -> Option<&Capability> {
        self.capability.as_ref()
    }

    pub fn as_request_handler(&self) -> Option<&Router> {
        match &self.capability {
            Some(Capability::RequestHandler(router)) => Some(router),
            None => None,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("capability", &self.capability)
            .finish()
    }
}

/// Metadata a plugin exports during init, for the driver and later plugins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub exports: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
}

/// Lifecycle of a single registration within one startup
///
/// `Skipped`, `Initialized` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Excluded by the resolver filter
    Skipped,
    /// Resolved, waiting for its turn
    Pending,
    /// Init is running
    Initializing,
    /// Init returned an instance
    Initialized,
    /// Init or configuration failed
    Failed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginState::Skipped => write!(f, "skipped"),
            PluginState::Pending => write!(f, "pending"),
            PluginState::Initializing => write!(f, "initializing"),
            PluginState::Initialized => write!(f, "initialized"),
            PluginState::Failed => write!(f, "failed"),
        }
    }
}
