//! Response bodies of the introspection API

use serde::Serialize;
use std::collections::BTreeMap;

use crate::plugin::{Plugin, PluginKey, PluginState};

/// Response for the plugin list
#[derive(Debug, Serialize)]
pub struct PluginsListResponse {
    /// Every registration, in key order
    pub plugins: Vec<PluginInfoResponse>,
    /// Total number of registrations
    pub total: usize,
}

/// One registration and what became of it
#[derive(Debug, Serialize)]
pub struct PluginInfoResponse {
    /// Composite key, `type/id`
    pub key: PluginKey,
    pub plugin_type: String,
    pub id: String,
    pub state: PluginState,
    /// Exports recorded during init
    pub exports: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
    /// Concrete type of the instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    /// Effective configuration after overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl PluginInfoResponse {
    pub fn new(key: &PluginKey, state: PluginState, plugin: Option<&Plugin>) -> Self {
        let meta = plugin.map(Plugin::meta);
        Self {
            key: key.clone(),
            plugin_type: key.plugin_type().to_string(),
            id: key.id().to_string(),
            state,
            exports: meta.map(|m| m.exports.clone()).unwrap_or_default(),
            capabilities: meta.map(|m| m.capabilities.clone()).unwrap_or_default(),
            instance_type: plugin
                .and_then(|p| p.instance().ok())
                .map(|i| i.type_name().to_string()),
            config: plugin.and_then(|p| p.config().cloned()),
        }
    }
}

/// Response for the health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub plugins: usize,
    pub timestamp: i64,
}
