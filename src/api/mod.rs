//! HTTP API module
//!
//! This module provides the HTTP server the initialized plugins are served
//! from, including:
//! - Attachment of the serving plugin's request handler
//! - Health and plugin introspection endpoints
//! - Request tracing middleware

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;

pub use handlers::AppState;
pub use middleware::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
pub use server::{shutdown_signal, ApiServer};
