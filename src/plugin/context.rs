//! Per-registration init context
//!
//! An [`InitContext`] lives for exactly one init call. It gives the plugin
//! its merged configuration, the global properties, a cancellation token
//! and read access to the plugins initialized before it. Lookups are limited
//! to the types the registration declared in `requires`.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::config::PluginConfig;
use super::registry::Registration;
use super::set::PluginSet;
use super::types::{Instance, Meta, PluginKey, PluginType};
use crate::core::error::{HostError, Result};

pub struct InitContext<'a> {
    registration: &'a Registration,
    plugins: &'a PluginSet,
    properties: &'a BTreeMap<String, String>,
    cancellation: CancellationToken,
    config: Option<Box<dyn PluginConfig>>,
    /// Exports and capabilities the plugin wants to advertise
    pub meta: Meta,
}

impl<'a> InitContext<'a> {
    /// Create a context whose configuration is a copy of the registration's default
    pub fn new(
        registration: &'a Registration,
        plugins: &'a PluginSet,
        properties: &'a BTreeMap<String, String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            registration,
            plugins,
            properties,
            cancellation,
            config: registration.config.clone(),
            meta: Meta::default(),
        }
    }

    pub fn key(&self) -> PluginKey {
        self.registration.key()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Global property set by the host, e.g. `address`
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        self.properties
    }

    /// Typed view of the merged configuration
    pub fn config<T: Any>(&self) -> Result<&T> {
        let config = self
            .config
            .as_deref()
            .ok_or_else(|| HostError::Plugin(format!("{} has no configuration", self.key())))?;

        config
            .as_any()
            .downcast_ref::<T>()
            .ok_or(HostError::UnexpectedInstance {
                expected: std::any::type_name::<T>(),
            })
    }

    /// Merge a configuration override onto this context's copy
    ///
    /// # Errors
    /// Returns `ConfigMergeFailure` if the plugin takes no configuration or
    /// the override does not fit its shape.
    pub fn merge_config(&mut self, overrides: &Value) -> Result<()> {
        let key = self.key();
        let config = self.config.as_mut().ok_or_else(|| HostError::ConfigMergeFailure {
            key: key.clone(),
            reason: "plugin takes no configuration".to_string(),
        })?;

        config
            .merge_override(overrides)
            .map_err(|reason| HostError::ConfigMergeFailure { key, reason })
    }

    /// Get the only initialized instance of a required type
    pub fn get_single(&self, plugin_type: &PluginType) -> Result<Instance> {
        self.check_declared(plugin_type)?;
        self.plugins.get_single(plugin_type)
    }

    /// Get every initialized instance of a required type
    ///
    /// For a declared type this never fails; an empty vector means no
    /// provider was enabled.
    pub fn get_all(&self, plugin_type: &PluginType) -> Result<Vec<Instance>> {
        self.check_declared(plugin_type)?;
        Ok(self.plugins.get_all(plugin_type))
    }

    /// Get the instance of an exact plugin, or its recorded failure
    pub fn get(&self, key: &PluginKey) -> Result<Instance> {
        self.check_declared(key.plugin_type())?;
        self.plugins.get(key)?.instance()
    }

    /// [`get_single`](Self::get_single), downcast to a concrete type
    pub fn get_single_as<T: Any + Send + Sync>(&self, plugin_type: &PluginType) -> Result<Arc<T>> {
        downcast(self.get_single(plugin_type)?)
    }

    /// [`get_all`](Self::get_all), downcast to a concrete type
    pub fn get_all_as<T: Any + Send + Sync>(&self, plugin_type: &PluginType) -> Result<Vec<Arc<T>>> {
        self.get_all(plugin_type)?.into_iter().map(downcast).collect()
    }

    /// Exports recorded by an already initialized plugin
    pub fn meta_of(&self, key: &PluginKey) -> Result<&Meta> {
        self.check_declared(key.plugin_type())?;
        Ok(self.plugins.get(key)?.meta())
    }

    fn check_declared(&self, plugin_type: &PluginType) -> Result<()> {
        if self.registration.requires_type(plugin_type) {
            Ok(())
        } else {
            Err(HostError::UndeclaredRequirement {
                key: self.key(),
                required: plugin_type.clone(),
            })
        }
    }

    /// Consume the context, keeping what the driver records
    pub(crate) fn into_parts(self) -> (Option<Box<dyn PluginConfig>>, Meta) {
        (self.config, self.meta)
    }
}

fn downcast<T: Any + Send + Sync>(instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().ok_or(HostError::UnexpectedInstance {
        expected: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::registry::init_fn;
    use crate::plugin::set::Plugin;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Settings {
        public: String,
    }

    fn noop_registration(plugin_type: &str, id: &str) -> Registration {
        Registration::new(plugin_type, id, init_fn(|_| Ok(Instance::new(()))))
    }

    fn set_with(entries: &[(&str, &str, u32)]) -> PluginSet {
        let mut set = PluginSet::new();
        for (plugin_type, id, value) in entries {
            let mut meta = Meta::default();
            meta.exports.insert("value".to_string(), value.to_string());
            set.add(Plugin::new(
                PluginKey::new(*plugin_type, *id),
                meta,
                None,
                Ok(Instance::new(*value)),
            ))
            .unwrap();
        }
        set
    }

    #[test]
    fn test_lookup_of_declared_type() {
        let registration = noop_registration("http.handler", "x").requires("storage.fs");
        let set = set_with(&[("storage.fs", "local", 5)]);
        let properties = BTreeMap::new();
        let ic = InitContext::new(&registration, &set, &properties, CancellationToken::new());

        let fs_type = PluginType::new("storage.fs");
        assert_eq!(*ic.get_single_as::<u32>(&fs_type).unwrap(), 5);
        assert_eq!(ic.get_all(&fs_type).unwrap().len(), 1);
        assert!(ic.get(&PluginKey::new("storage.fs", "local")).is_ok());
        assert_eq!(
            ic.meta_of(&PluginKey::new("storage.fs", "local"))
                .unwrap()
                .exports
                .get("value")
                .map(String::as_str),
            Some("5")
        );
    }

    #[test]
    fn test_lookup_of_undeclared_type_is_refused() {
        let registration = noop_registration("http.handler", "x");
        let set = set_with(&[("storage.fs", "local", 5)]);
        let properties = BTreeMap::new();
        let ic = InitContext::new(&registration, &set, &properties, CancellationToken::new());

        let fs_type = PluginType::new("storage.fs");
        assert!(matches!(
            ic.get_single(&fs_type),
            Err(HostError::UndeclaredRequirement { .. })
        ));
        assert!(matches!(
            ic.get_all(&fs_type),
            Err(HostError::UndeclaredRequirement { .. })
        ));
        assert!(matches!(
            ic.get(&PluginKey::new("storage.fs", "local")),
            Err(HostError::UndeclaredRequirement { .. })
        ));
    }

    #[test]
    fn test_declared_type_without_providers() {
        let registration = noop_registration("http.handler", "x").requires("storage.fs");
        let set = PluginSet::new();
        let properties = BTreeMap::new();
        let ic = InitContext::new(&registration, &set, &properties, CancellationToken::new());

        let fs_type = PluginType::new("storage.fs");
        assert!(ic.get_all(&fs_type).unwrap().is_empty());
        assert!(matches!(
            ic.get_single(&fs_type),
            Err(HostError::LookupNotFound(_))
        ));
    }

    #[test]
    fn test_wrong_instance_type_is_reported() {
        let registration = noop_registration("http.handler", "x").requires("storage.fs");
        let set = set_with(&[("storage.fs", "local", 5)]);
        let properties = BTreeMap::new();
        let ic = InitContext::new(&registration, &set, &properties, CancellationToken::new());

        assert!(matches!(
            ic.get_single_as::<String>(&PluginType::new("storage.fs")),
            Err(HostError::UnexpectedInstance { .. })
        ));
    }

    #[test]
    fn test_config_is_a_copy_of_the_default() {
        let registration = noop_registration("storage.fs", "local").with_config(Settings {
            public: "/var/www/default".to_string(),
        });
        let set = PluginSet::new();
        let properties = BTreeMap::new();
        let mut ic = InitContext::new(&registration, &set, &properties, CancellationToken::new());

        ic.merge_config(&json!({ "public": "/srv/www" })).unwrap();
        assert_eq!(ic.config::<Settings>().unwrap().public, "/srv/www");

        let default = registration
            .config
            .as_deref()
            .and_then(|c| c.as_any().downcast_ref::<Settings>())
            .unwrap();
        assert_eq!(default.public, "/var/www/default");
    }

    #[test]
    fn test_config_merge_failures() {
        let with_config = noop_registration("storage.fs", "local").with_config(Settings {
            public: "/var/www/default".to_string(),
        });
        let without_config = noop_registration("storage.fs", "bare");
        let set = PluginSet::new();
        let properties = BTreeMap::new();

        let mut ic = InitContext::new(&with_config, &set, &properties, CancellationToken::new());
        assert!(matches!(
            ic.merge_config(&json!({ "color": "blue" })),
            Err(HostError::ConfigMergeFailure { .. })
        ));

        let mut ic = InitContext::new(&without_config, &set, &properties, CancellationToken::new());
        assert!(matches!(
            ic.merge_config(&json!({ "public": "/srv" })),
            Err(HostError::ConfigMergeFailure { .. })
        ));
        assert!(ic.config::<Settings>().is_err());
    }

    #[test]
    fn test_properties_and_cancellation() {
        let registration = noop_registration("storage.fs", "local");
        let set = PluginSet::new();
        let mut properties = BTreeMap::new();
        properties.insert("address".to_string(), ":3333".to_string());
        let token = CancellationToken::new();
        let ic = InitContext::new(&registration, &set, &properties, token.child_token());

        assert_eq!(ic.property("address"), Some(":3333"));
        assert_eq!(ic.property("missing"), None);
        assert!(!ic.is_cancelled());
        token.cancel();
        assert!(ic.is_cancelled());
    }
}
