//! Introspection API handlers
//!
//! Everything here reads the initialized plugin set; nothing mutates it.

use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::models::{HealthResponse, PluginInfoResponse, PluginsListResponse};
use crate::core::error::{HostError, Result};
use crate::plugin::{PluginKey, PluginSet, PluginState};

/// Application state shared by handlers
#[derive(Clone)]
pub struct AppState {
    pub plugins: Arc<PluginSet>,
    pub states: Arc<BTreeMap<PluginKey, PluginState>>,
}

impl AppState {
    pub fn new(plugins: PluginSet, states: BTreeMap<PluginKey, PluginState>) -> Self {
        Self {
            plugins: Arc::new(plugins),
            states: Arc::new(states),
        }
    }

    fn info(&self, key: &PluginKey, state: PluginState) -> PluginInfoResponse {
        PluginInfoResponse::new(key, state, self.plugins.get(key).ok())
    }
}

/// Handler for GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        plugins: state.plugins.len(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// Handler for GET /api/plugins - List every registration and its state
pub async fn list_plugins(State(state): State<AppState>) -> Json<PluginsListResponse> {
    let plugins: Vec<PluginInfoResponse> = state
        .states
        .iter()
        .map(|(key, plugin_state)| state.info(key, *plugin_state))
        .collect();

    Json(PluginsListResponse {
        total: plugins.len(),
        plugins,
    })
}

/// Handler for GET /api/plugins/:type/:id - Get one registration
pub async fn get_plugin(
    State(state): State<AppState>,
    Path((plugin_type, id)): Path<(String, String)>,
) -> Result<Json<PluginInfoResponse>> {
    let key = PluginKey::new(plugin_type, id);
    let plugin_state = state
        .states
        .get(&key)
        .copied()
        .ok_or_else(|| HostError::LookupNotFound(key.to_string()))?;

    Ok(Json(state.info(&key, plugin_state)))
}
