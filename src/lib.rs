//! Plugin Host Library
//!
//! This library provides a plugin registry with dependency-ordered
//! initialization, the built-in storage and file server plugins, and the
//! HTTP server the initialized plugins are served from.

pub mod api;
pub mod core;
pub mod plugin;
pub mod plugins;

// Re-export commonly used types
pub use api::ApiServer;
pub use crate::core::{Config, HostError, Logger};
pub use plugin::{Driver, Initialized, PluginRegistry, Registration};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
