//! Error type system for the plugin host
//!
//! This module provides the error kinds raised while registering, resolving
//! and initializing plugins, plus:
//! - Stable error kind names for diagnostics
//! - HTTP status code mapping for the introspection API
//! - JSON error responses with trace IDs

use crate::plugin::types::{PluginKey, PluginType};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Main error type for the plugin host
///
/// Cloneable so a failure can be kept in the plugin set and returned to the
/// caller at the same time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    // Registration and resolution errors
    #[error("Duplicate registration: {key} is already registered")]
    DuplicateRegistration { key: PluginKey },

    #[error("Dependency cycle detected: {}", format_cycle(.cycle))]
    CycleDetected { cycle: Vec<PluginKey> },

    #[error("Unsatisfied requirement: {key} requires at least one enabled {required} plugin")]
    UnsatisfiedRequirement { key: PluginKey, required: PluginType },

    // Initialization errors
    #[error("Config merge failed for {key}: {reason}")]
    ConfigMergeFailure { key: PluginKey, reason: String },

    #[error("Plugin {key} failed to initialize: {source}")]
    InitializationFailure {
        key: PluginKey,
        #[source]
        source: Arc<HostError>,
    },

    #[error("Plugin {key} initialization was cancelled")]
    Cancelled { key: PluginKey },

    #[error("Plugin {key} initialization timed out after {after:?}")]
    Timeout { key: PluginKey, after: Duration },

    #[error("Plugin {0} is already in the plugin set")]
    AlreadyInitialized(PluginKey),

    // Lookup errors
    #[error("Plugin not found: {0}")]
    LookupNotFound(String),

    #[error("Ambiguous lookup: {count} initialized plugins of type {plugin_type}")]
    LookupAmbiguous { plugin_type: PluginType, count: usize },

    #[error("Plugin {key} looked up {required} without declaring it as a requirement")]
    UndeclaredRequirement { key: PluginKey, required: PluginType },

    #[error("Unexpected instance type: expected {expected}")]
    UnexpectedInstance { expected: &'static str },

    // Serving errors
    #[error("Route {route} already has a handler, cannot attach {key}")]
    RouteConflict { route: String, key: PluginKey },

    // Plugin body errors
    #[error("Plugin error: {0}")]
    Plugin(String),
}

fn format_cycle(cycle: &[PluginKey]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl HostError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 404 Not Found
            HostError::LookupNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            HostError::LookupAmbiguous { .. }
            | HostError::DuplicateRegistration { .. }
            | HostError::AlreadyInitialized(_)
            | HostError::RouteConflict { .. } => StatusCode::CONFLICT,

            // 403 Forbidden
            HostError::UndeclaredRequirement { .. } => StatusCode::FORBIDDEN,

            // 503 Service Unavailable
            HostError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            HostError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            HostError::CycleDetected { .. }
            | HostError::UnsatisfiedRequirement { .. }
            | HostError::ConfigMergeFailure { .. }
            | HostError::InitializationFailure { .. }
            | HostError::UnexpectedInstance { .. }
            | HostError::Plugin(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error kind name used in diagnostics and API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            HostError::DuplicateRegistration { .. } => "DuplicateRegistration",
            HostError::CycleDetected { .. } => "CycleDetected",
            HostError::UnsatisfiedRequirement { .. } => "UnsatisfiedRequirement",
            HostError::ConfigMergeFailure { .. } => "ConfigMergeFailure",
            HostError::InitializationFailure { .. } => "InitializationFailure",
            HostError::Cancelled { .. } => "Cancelled",
            HostError::Timeout { .. } => "Timeout",
            HostError::AlreadyInitialized(_) => "AlreadyInitialized",
            HostError::LookupNotFound(_) => "LookupNotFound",
            HostError::LookupAmbiguous { .. } => "LookupAmbiguous",
            HostError::UndeclaredRequirement { .. } => "UndeclaredRequirement",
            HostError::UnexpectedInstance { .. } => "UnexpectedInstance",
            HostError::RouteConflict { .. } => "RouteConflict",
            HostError::Plugin(_) => "PluginError",
        }
    }

    /// The composite key of the plugin this error is attributed to, if any
    pub fn plugin_key(&self) -> Option<&PluginKey> {
        match self {
            HostError::DuplicateRegistration { key }
            | HostError::UnsatisfiedRequirement { key, .. }
            | HostError::ConfigMergeFailure { key, .. }
            | HostError::InitializationFailure { key, .. }
            | HostError::Cancelled { key }
            | HostError::Timeout { key, .. }
            | HostError::UndeclaredRequirement { key, .. }
            | HostError::RouteConflict { key, .. }
            | HostError::AlreadyInitialized(key) => Some(key),
            HostError::CycleDetected { cycle } => cycle.first(),
            _ => None,
        }
    }
}

/// Error response structure for API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unique trace ID for this error
    pub trace_id: String,
}

impl ErrorResponse {
    /// Create a new error response with a generated trace ID
    pub fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            details: None,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an error response with additional details
    pub fn with_details(error: String, message: String, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(error, message)
        }
    }

    /// Create an error response from a HostError
    pub fn from_error(error: &HostError) -> Self {
        match error.plugin_key() {
            Some(key) => Self::with_details(
                error.error_type().to_string(),
                error.to_string(),
                serde_json::json!({ "plugin": key.to_string() }),
            ),
            None => Self::new(error.error_type().to_string(), error.to_string()),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (trace_id: {})",
            self.error,
            self.message,
            self.details.as_ref().map_or("", |_| "with details"),
            self.trace_id
        )
    }
}

/// Implement IntoResponse for HostError to enable automatic error handling in Axum
impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = ErrorResponse::from_error(&self);

        tracing::error!(
            error_type = self.error_type(),
            trace_id = %error_response.trace_id,
            status_code = %status_code,
            "Request failed: {}",
            self
        );

        (status_code, Json(error_response)).into_response()
    }
}

/// Result type alias for operations that can fail with HostError
pub type Result<T> = std::result::Result<T, HostError>;

/// Context extension trait for turning foreign errors into plugin errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| HostError::Plugin(format!("{}: {}", context.into(), e)))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| HostError::Plugin(format!("{}: {}", f(), e)))
    }
}
