//! Set of initialized plugins
//!
//! Append-only: the driver adds one entry per registration in resolution
//! order, and nothing is ever replaced or removed. Init contexts and the
//! serving layer only read from it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::types::{Instance, Meta, PluginKey, PluginType};
use crate::core::error::{HostError, Result};

/// Outcome of one registration's init
#[derive(Debug)]
pub struct Plugin {
    key: PluginKey,
    meta: Meta,
    config: Option<Value>,
    result: std::result::Result<Instance, Arc<HostError>>,
}

impl Plugin {
    pub fn new(
        key: PluginKey,
        meta: Meta,
        config: Option<Value>,
        result: std::result::Result<Instance, Arc<HostError>>,
    ) -> Self {
        Self {
            key,
            meta,
            config,
            result,
        }
    }

    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    pub fn plugin_type(&self) -> &PluginType {
        self.key.plugin_type()
    }

    /// Metadata exported by the plugin during init
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Effective configuration the plugin was initialized with
    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    /// The instance, or the failure recorded for this plugin
    pub fn instance(&self) -> Result<Instance> {
        match &self.result {
            Ok(instance) => Ok(instance.clone()),
            Err(source) => Err(HostError::InitializationFailure {
                key: self.key.clone(),
                source: source.clone(),
            }),
        }
    }

    pub fn err(&self) -> Option<&HostError> {
        self.result.as_ref().err().map(|e| &**e)
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Initialized plugins indexed by composite key and by type
#[derive(Debug, Default)]
pub struct PluginSet {
    ordered: Vec<PluginKey>,
    plugins: HashMap<PluginKey, Plugin>,
    by_type: HashMap<PluginType, Vec<PluginKey>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin
    ///
    /// # Errors
    /// Returns `AlreadyInitialized` if the key is already present; the set
    /// is left unchanged.
    pub fn add(&mut self, plugin: Plugin) -> Result<()> {
        let key = plugin.key().clone();
        if self.plugins.contains_key(&key) {
            return Err(HostError::AlreadyInitialized(key));
        }

        self.by_type
            .entry(key.plugin_type().clone())
            .or_default()
            .push(key.clone());
        self.ordered.push(key.clone());
        self.plugins.insert(key, plugin);
        Ok(())
    }

    /// Get the entry for an exact composite key
    pub fn get(&self, key: &PluginKey) -> Result<&Plugin> {
        self.plugins
            .get(key)
            .ok_or_else(|| HostError::LookupNotFound(key.to_string()))
    }

    /// Get the only successfully initialized instance of a type
    ///
    /// # Errors
    /// - `LookupNotFound` if no entry of the type initialized successfully
    /// - `LookupAmbiguous` if more than one did
    pub fn get_single(&self, plugin_type: &PluginType) -> Result<Instance> {
        let mut instances = self.get_all(plugin_type);
        match instances.len() {
            0 => Err(HostError::LookupNotFound(format!("plugin of type {}", plugin_type))),
            1 => Ok(instances.remove(0)),
            count => Err(HostError::LookupAmbiguous {
                plugin_type: plugin_type.clone(),
                count,
            }),
        }
    }

    /// Get every successfully initialized instance of a type, in the order
    /// they were added
    pub fn get_all(&self, plugin_type: &PluginType) -> Vec<Instance> {
        self.by_type
            .get(plugin_type)
            .into_iter()
            .flatten()
            .filter_map(|key| self.plugins.get(key))
            .filter_map(|plugin| plugin.instance().ok())
            .collect()
    }

    /// Iterate over every entry in the order it was added
    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.ordered.iter().filter_map(|key| self.plugins.get(key))
    }

    pub fn contains(&self, key: &PluginKey) -> bool {
        self.plugins.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(plugin_type: &str, id: &str, value: u32) -> Plugin {
        Plugin::new(
            PluginKey::new(plugin_type, id),
            Meta::default(),
            None,
            Ok(Instance::new(value)),
        )
    }

    fn failed(plugin_type: &str, id: &str) -> Plugin {
        Plugin::new(
            PluginKey::new(plugin_type, id),
            Meta::default(),
            None,
            Err(Arc::new(HostError::Plugin("broken".into()))),
        )
    }

    fn values(instances: &[Instance]) -> Vec<u32> {
        instances
            .iter()
            .map(|i| *i.downcast_ref::<u32>().unwrap())
            .collect()
    }

    #[test]
    fn test_get_single_with_one_entry() {
        let mut set = PluginSet::new();
        set.add(ok("storage.fs", "local", 7)).unwrap();

        let instance = set.get_single(&PluginType::new("storage.fs")).unwrap();
        assert_eq!(instance.downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn test_get_single_with_no_entry() {
        let set = PluginSet::new();
        let err = set.get_single(&PluginType::new("storage.fs")).unwrap_err();
        assert!(matches!(err, HostError::LookupNotFound(_)));
    }

    #[test]
    fn test_get_single_with_two_entries() {
        let mut set = PluginSet::new();
        set.add(ok("storage.fs", "a", 1)).unwrap();
        set.add(ok("storage.fs", "b", 2)).unwrap();

        match set.get_single(&PluginType::new("storage.fs")) {
            Err(HostError::LookupAmbiguous { count, .. }) => assert_eq!(count, 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_get_single_ignores_failed_entries() {
        let mut set = PluginSet::new();
        set.add(failed("storage.fs", "a")).unwrap();
        set.add(ok("storage.fs", "b", 2)).unwrap();

        let instance = set.get_single(&PluginType::new("storage.fs")).unwrap();
        assert_eq!(instance.downcast_ref::<u32>(), Some(&2));

        let mut only_failed = PluginSet::new();
        only_failed.add(failed("storage.fs", "a")).unwrap();
        assert!(matches!(
            only_failed.get_single(&PluginType::new("storage.fs")),
            Err(HostError::LookupNotFound(_))
        ));
    }

    #[test]
    fn test_get_all_is_empty_for_unknown_type() {
        let mut set = PluginSet::new();
        set.add(ok("storage.fs", "a", 1)).unwrap();
        assert!(set.get_all(&PluginType::new("http.handler")).is_empty());
    }

    #[test]
    fn test_get_all_preserves_insertion_order() {
        let mut set = PluginSet::new();
        set.add(ok("storage.fs", "z", 1)).unwrap();
        set.add(ok("http.handler", "x", 9)).unwrap();
        set.add(failed("storage.fs", "m")).unwrap();
        set.add(ok("storage.fs", "a", 3)).unwrap();

        let all = set.get_all(&PluginType::new("storage.fs"));
        assert_eq!(values(&all), vec![1, 3]);
    }

    #[test]
    fn test_get_by_key_returns_recorded_failure() {
        let mut set = PluginSet::new();
        set.add(failed("storage.fs", "a")).unwrap();

        let key = PluginKey::new("storage.fs", "a");
        let plugin = set.get(&key).unwrap();
        assert!(!plugin.is_ok());
        assert!(matches!(plugin.err(), Some(HostError::Plugin(_))));
        assert!(matches!(
            plugin.instance(),
            Err(HostError::InitializationFailure { .. })
        ));

        assert!(matches!(
            set.get(&PluginKey::new("storage.fs", "b")),
            Err(HostError::LookupNotFound(_))
        ));
    }

    #[test]
    fn test_add_duplicate_key_fails_and_keeps_first() {
        let mut set = PluginSet::new();
        set.add(ok("storage.fs", "a", 1)).unwrap();

        let err = set.add(ok("storage.fs", "a", 2)).unwrap_err();
        assert!(matches!(err, HostError::AlreadyInitialized(_)));

        let all = set.get_all(&PluginType::new("storage.fs"));
        assert_eq!(values(&all), vec![1]);
        assert_eq!(set.len(), 1);
    }
}
