//! Plugin registry implementation
//!
//! This module provides the registration record a plugin author supplies and
//! the registry that collects them before initialization begins. The
//! registry is filled by explicit `register` calls from the host's bootstrap
//! list and is read-only once the driver runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::config::PluginConfig;
use super::context::InitContext;
use super::resolver::{self, Resolution};
use super::types::{Instance, PluginKey, PluginType};
use crate::core::error::{HostError, Result};

/// Initialization body of a plugin
///
/// Runs once per startup, after every plugin whose type this registration
/// requires. Dependencies are reached through the [`InitContext`].
#[async_trait]
pub trait PluginInit: Send + Sync {
    async fn init(&self, ic: &mut InitContext<'_>) -> Result<Instance>;
}

/// Adapter turning a synchronous closure into a [`PluginInit`]
pub struct InitFn<F>(F);

/// Wrap a synchronous closure as a plugin init body
pub fn init_fn<F>(f: F) -> InitFn<F>
where
    F: Fn(&mut InitContext<'_>) -> Result<Instance> + Send + Sync,
{
    InitFn(f)
}

#[async_trait]
impl<F> PluginInit for InitFn<F>
where
    F: Fn(&mut InitContext<'_>) -> Result<Instance> + Send + Sync,
{
    async fn init(&self, ic: &mut InitContext<'_>) -> Result<Instance> {
        (self.0)(ic)
    }
}

/// A dependency on every enabled plugin of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub plugin_type: PluginType,
    /// Fail resolution when no enabled plugin provides the type
    pub mandatory: bool,
}

/// Registration record
///
/// Immutable once registered. The composite key `(plugin_type, id)` must be
/// unique across the registry.
pub struct Registration {
    pub plugin_type: PluginType,
    pub id: String,
    pub requires: Vec<Requirement>,
    /// Default configuration; overrides are merged onto a copy of it
    pub config: Option<Box<dyn PluginConfig>>,
    init: Arc<dyn PluginInit>,
}

impl Registration {
    /// Create a registration with no requirements and no configuration
    pub fn new(
        plugin_type: impl Into<PluginType>,
        id: impl Into<String>,
        init: impl PluginInit + 'static,
    ) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            id: id.into(),
            requires: Vec::new(),
            config: None,
            init: Arc::new(init),
        }
    }

    /// Require a type; zero providers only fails when init looks one up
    pub fn requires(self, plugin_type: impl Into<PluginType>) -> Self {
        self.with_requirement(plugin_type.into(), false)
    }

    /// Require at least one enabled provider of a type, checked at resolution
    pub fn requires_mandatory(self, plugin_type: impl Into<PluginType>) -> Self {
        self.with_requirement(plugin_type.into(), true)
    }

    fn with_requirement(mut self, plugin_type: PluginType, mandatory: bool) -> Self {
        match self.requires.iter_mut().find(|r| r.plugin_type == plugin_type) {
            Some(existing) => existing.mandatory |= mandatory,
            None => self.requires.push(Requirement {
                plugin_type,
                mandatory,
            }),
        }
        self
    }

    /// Set the default configuration
    pub fn with_config(mut self, config: impl PluginConfig) -> Self {
        self.config = Some(Box::new(config));
        self
    }

    pub fn key(&self) -> PluginKey {
        PluginKey::new(self.plugin_type.clone(), self.id.clone())
    }

    /// Whether this registration declared a requirement on `plugin_type`
    pub fn requires_type(&self, plugin_type: &PluginType) -> bool {
        self.requires.iter().any(|r| &r.plugin_type == plugin_type)
    }

    pub fn init(&self) -> &dyn PluginInit {
        self.init.as_ref()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("plugin_type", &self.plugin_type)
            .field("id", &self.id)
            .field("requires", &self.requires)
            .field("config", &self.config)
            .finish()
    }
}

/// Plugin registry
///
/// Maintains every registration keyed by composite key. Iteration is in key
/// order, independent of the order `register` was called in.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    registrations: BTreeMap<PluginKey, Registration>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin
    ///
    /// # Errors
    /// Returns `DuplicateRegistration` if the composite key is already
    /// registered; the existing registration is kept.
    pub fn register(&mut self, registration: Registration) -> Result<()> {
        let key = registration.key();

        if self.registrations.contains_key(&key) {
            return Err(HostError::DuplicateRegistration { key });
        }

        tracing::debug!(
            key = %key,
            requires = ?registration
                .requires
                .iter()
                .map(|r| r.plugin_type.as_str())
                .collect::<Vec<_>>(),
            "Registered plugin"
        );

        self.registrations.insert(key, registration);
        Ok(())
    }

    /// Get a registration by composite key
    pub fn get(&self, key: &PluginKey) -> Option<&Registration> {
        self.registrations.get(key)
    }

    /// Iterate over all registrations in key order
    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.values()
    }

    /// Find registrations by type
    pub fn find_by_type(&self, plugin_type: &PluginType) -> Vec<&Registration> {
        self.iter()
            .filter(|r| &r.plugin_type == plugin_type)
            .collect()
    }

    /// Compute the initialization order
    ///
    /// Registrations for which `filter` returns `true` are skipped before any
    /// graph work is done.
    ///
    /// # Errors
    /// Returns `CycleDetected` or `UnsatisfiedRequirement`; see
    /// [`resolver::resolve`].
    pub fn graph<F>(&self, filter: F) -> Result<Resolution<'_>>
    where
        F: Fn(&Registration) -> bool,
    {
        resolver::resolve(self, filter)
    }

    /// Returns the number of registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl PluginInit {
        init_fn(|_| Ok(Instance::new(())))
    }

    #[test]
    fn test_register_plugin() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Registration::new("storage.fs", "local", noop()))
            .unwrap();

        let key = PluginKey::new("storage.fs", "local");
        assert!(registry.get(&key).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate_plugin() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Registration::new("storage.fs", "local", noop()).requires("a"))
            .unwrap();

        let err = registry
            .register(Registration::new("storage.fs", "local", noop()).requires("b"))
            .unwrap_err();

        assert!(matches!(err, HostError::DuplicateRegistration { .. }));
        let kept = registry.get(&PluginKey::new("storage.fs", "local")).unwrap();
        assert!(kept.requires_type(&PluginType::new("a")));
        assert!(!kept.requires_type(&PluginType::new("b")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_id_different_type_is_allowed() {
        let mut registry = PluginRegistry::new();
        registry.register(Registration::new("a", "x", noop())).unwrap();
        registry.register(Registration::new("b", "x", noop())).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_find_by_type() {
        let mut registry = PluginRegistry::new();
        registry.register(Registration::new("storage.fs", "b", noop())).unwrap();
        registry.register(Registration::new("storage.fs", "a", noop())).unwrap();
        registry.register(Registration::new("http.handler", "x", noop())).unwrap();

        let found = registry.find_by_type(&PluginType::new("storage.fs"));
        let ids: Vec<_> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_repeated_requirement_is_merged() {
        let registration = Registration::new("http.handler", "x", noop())
            .requires("storage.fs")
            .requires_mandatory("storage.fs");

        assert_eq!(
            registration.requires,
            vec![Requirement {
                plugin_type: PluginType::new("storage.fs"),
                mandatory: true,
            }]
        );
    }
}
