//! Core module
//!
//! This module provides the ambient layer of the host:
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{ErrorContext, ErrorResponse, HostError, Result};
pub use logging::Logger;
