//! HTTP Server implementation
//!
//! This module provides the HTTP server using Axum framework with:
//! - The serving plugin's request handler attached at the root route
//! - Health check and plugin introspection endpoints
//! - Request tracing
//! - Graceful shutdown handling

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::handlers::{get_plugin, health_check, list_plugins, AppState};
use crate::api::middleware::trace_id_middleware;
use crate::core::config::Config;
use crate::plugin::{Initialized, PluginKey};

/// HTTP API Server
pub struct ApiServer {
    router: Router,
    addr: SocketAddr,
}

impl ApiServer {
    /// Create a server for an initialized plugin set
    pub fn new(config: &Config, initialized: Initialized) -> anyhow::Result<Self> {
        let addr = config.socket_addr()?;
        Ok(Self {
            router: Self::build_router(initialized),
            addr,
        })
    }

    /// Build the router: host endpoints first, the plugin handler for everything else
    pub fn build_router(initialized: Initialized) -> Router {
        let Initialized {
            plugins,
            states,
            handler,
        } = initialized;

        let api_router = Router::new()
            .route("/health", get(health_check))
            .route("/api/plugins", get(list_plugins))
            .route("/api/plugins/:type/:id", get(get_plugin))
            .with_state(AppState::new(plugins, states));

        let router = match handler {
            Some((key, handler)) => {
                info!(key = %key, "Serving plugin handler at /");
                api_router.fallback_service(handler)
            }
            None => {
                warn!("No request handler initialized; only host endpoints are served");
                api_router
            }
        };

        router.layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(trace_id_middleware))
                .layer(TraceLayer::new_for_http()),
        )
    }

    /// Start the HTTP server and listen for requests
    ///
    /// Runs until `shutdown` is cancelled, then drains open connections.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(addr = %self.addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %listener.local_addr()?, "HTTP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("HTTP server shut down gracefully");

        Ok(())
    }

    /// Get a reference to the router
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Handler key for logs and introspection of the served route
pub fn served_by(initialized: &Initialized) -> Option<&PluginKey> {
    initialized.handler.as_ref().map(|(key, _)| key)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Initiating graceful shutdown...");
}
