//! Plugin system module
//!
//! This module provides the plugin engine:
//! - Registration records and the registry they are collected in
//! - Dependency graph resolution into an initialization order
//! - The append-only plugin set built during initialization
//! - The per-registration init context
//! - The driver that runs the whole sequence

pub mod config;
pub mod context;
pub mod driver;
pub mod registry;
pub mod resolver;
pub mod set;
pub mod types;

pub use config::{merge_shallow, PluginConfig};
pub use context::InitContext;
pub use driver::{Aborted, Driver, Initialized, ROOT_ROUTE};
pub use registry::{init_fn, InitFn, PluginInit, PluginRegistry, Registration, Requirement};
pub use resolver::{resolve, Resolution};
pub use set::{Plugin, PluginSet};
pub use types::{
    Capability, Instance, Meta, PluginKey, PluginState, PluginType, HTTP_HANDLER, STORAGE_FS,
};
