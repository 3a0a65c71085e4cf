//! Plugin Host
//!
//! Registers the built-in plugins, initializes them in dependency order and
//! serves the resulting HTTP handler.

use plugin_host::{api, core, plugin, plugins};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Initialize logging system based on configuration
    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting Plugin Host v{}", plugin_host::VERSION);
    info!(
        address = %config.address,
        overrides = config.plugins.len(),
        disabled = ?config.disabled_plugins,
        init_timeout_secs = ?config.init.timeout_secs,
        "Configuration loaded"
    );

    let registry = plugins::bootstrap()?;
    info!(registered = registry.len(), "Plugin registry ready");

    // Ctrl+C or SIGTERM aborts startup, or shuts the server down once it runs
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        api::shutdown_signal().await;
        signal_token.cancel();
    });

    let driver = plugin::Driver::from_config(registry, &config, shutdown.clone());
    let initialized = match driver.initialize().await {
        Ok(initialized) => initialized,
        Err(aborted) => {
            let e = aborted.error;
            for (key, state) in &aborted.initialized.states {
                info!(key = %key, state = ?state, "Plugin state at abort");
            }
            error!(
                error_type = e.error_type(),
                key = ?e.plugin_key().map(ToString::to_string),
                "Startup aborted: {}",
                e
            );
            return Err(e.into());
        }
    };

    if let Some(key) = api::server::served_by(&initialized) {
        info!(key = %key, "Request handler ready");
    }

    let server = api::ApiServer::new(&config, initialized)?;
    server.serve(shutdown).await?;

    info!("Plugin Host stopped");
    Ok(())
}
