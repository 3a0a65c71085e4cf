//! Plugin initialization driver
//!
//! The driver resolves the registry into an order and initializes each
//! registration in turn. Initialization is strictly sequential; the first
//! failure aborts the remaining sequence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::InitContext;
use super::registry::{PluginRegistry, Registration};
use super::set::{Plugin, PluginSet};
use super::types::{Instance, Meta, PluginKey, PluginState, PluginType, HTTP_HANDLER};
use crate::core::config::Config;
use crate::core::error::{HostError, Result};

/// Route the request handler is attached to
pub const ROOT_ROUTE: &str = "/";

/// Result of a completed initialization phase
///
/// Read-only from here on; the serving layer shares it between requests.
#[derive(Debug, Default)]
pub struct Initialized {
    pub plugins: PluginSet,
    /// Final state of every registration, including skipped ones
    pub states: BTreeMap<PluginKey, PluginState>,
    /// Request handler for the root route, if a serving plugin provided one
    pub handler: Option<(PluginKey, Router)>,
}

/// A startup that stopped at a failing registration
///
/// `initialized` holds every plugin processed before the failure plus the
/// failed entry itself, whose state is `Failed`.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct Aborted {
    pub error: HostError,
    pub initialized: Initialized,
}

/// Drives the initialization of every registration in a registry
pub struct Driver {
    registry: PluginRegistry,
    overrides: HashMap<String, Value>,
    properties: BTreeMap<String, String>,
    disabled: Vec<String>,
    cancellation: CancellationToken,
    init_timeout: Option<Duration>,
    serving_type: PluginType,
}

impl Driver {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            overrides: HashMap::new(),
            properties: BTreeMap::new(),
            disabled: Vec::new(),
            cancellation: CancellationToken::new(),
            init_timeout: None,
            serving_type: PluginType::new(HTTP_HANDLER),
        }
    }

    /// Build a driver from the startup configuration
    ///
    /// The listen address is published to plugins as the `address` property.
    pub fn from_config(
        registry: PluginRegistry,
        config: &Config,
        cancellation: CancellationToken,
    ) -> Self {
        let mut driver = Self::new(registry).with_cancellation(cancellation);
        driver.overrides = config.plugins.clone();
        driver.properties = config.properties.clone();
        driver
            .properties
            .insert("address".to_string(), config.address.clone());
        driver.disabled = config.disabled_plugins.clone();
        driver.init_timeout = config.init.timeout();
        driver
    }

    /// Configuration override for the plugin with composite key `key`
    pub fn with_override(mut self, key: impl Into<String>, value: Value) -> Self {
        self.overrides.insert(key.into(), value);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Exclude a composite key, or every registration of a type
    pub fn disable(mut self, key_or_type: impl Into<String>) -> Self {
        self.disabled.push(key_or_type.into());
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    fn is_disabled(&self, registration: &Registration) -> bool {
        let key = registration.key().to_string();
        self.disabled
            .iter()
            .any(|d| *d == key || d == registration.plugin_type.as_str())
    }

    /// Resolve and initialize every enabled registration
    ///
    /// # Errors
    /// See [`initialize`](Self::initialize); only the error is kept.
    pub async fn run(&self) -> Result<Initialized> {
        self.initialize().await.map_err(|aborted| aborted.error)
    }

    /// Resolve and initialize every enabled registration, keeping what was
    /// built if startup stops early
    ///
    /// # Errors
    /// Resolution errors are returned before any init runs. Otherwise the
    /// first failing registration stops the sequence with
    /// `ConfigMergeFailure`, `InitializationFailure`, `Cancelled`, `Timeout`
    /// or `RouteConflict`.
    pub async fn initialize(&self) -> std::result::Result<Initialized, Aborted> {
        let mut initialized = Initialized::default();

        let resolution = match self.registry.graph(|r| self.is_disabled(r)) {
            Ok(resolution) => resolution,
            Err(error) => return Err(Aborted { error, initialized }),
        };

        info!(
            count = resolution.order.len(),
            skipped = resolution.skipped.len(),
            order = ?resolution.keys().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Resolved plugin initialization order"
        );

        for registration in &resolution.skipped {
            info!(key = %registration.key(), "Skipping disabled plugin");
            initialized
                .states
                .insert(registration.key(), PluginState::Skipped);
        }
        for registration in &resolution.order {
            initialized
                .states
                .insert(registration.key(), PluginState::Pending);
        }

        self.warn_unmatched_overrides();

        for registration in resolution.order {
            let key = registration.key();
            if let Err(error) = self.step(registration, &mut initialized).await {
                record_failure(&key, &error, &mut initialized);
                error!(
                    key = %key,
                    error_type = error.error_type(),
                    initialized = initialized.plugins.iter().filter(|p| p.is_ok()).count(),
                    "Plugin initialization failed: {}",
                    error
                );
                return Err(Aborted { error, initialized });
            }
        }

        info!(
            initialized = initialized.plugins.len(),
            handler = ?initialized.handler.as_ref().map(|(key, _)| key.to_string()),
            "All plugins initialized"
        );

        Ok(initialized)
    }

    async fn step(&self, registration: &Registration, initialized: &mut Initialized) -> Result<()> {
        let key = registration.key();

        if self.cancellation.is_cancelled() {
            return Err(HostError::Cancelled { key });
        }

        initialized
            .states
            .insert(key.clone(), PluginState::Initializing);
        info!(key = %key, "Initializing plugin");
        let started = Instant::now();

        let (instance, mut meta, config) = self.init_one(registration, &initialized.plugins).await?;

        if let Some(capability) = instance.capability() {
            let name = capability.name().to_string();
            if !meta.capabilities.contains(&name) {
                meta.capabilities.push(name);
            }
        }

        self.attach_handler(registration, &instance, initialized)?;

        initialized
            .plugins
            .add(Plugin::new(key.clone(), meta, config, Ok(instance)))?;
        initialized
            .states
            .insert(key.clone(), PluginState::Initialized);

        info!(
            key = %key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Plugin initialized"
        );
        Ok(())
    }

    /// Run one registration's init inside a fresh context
    async fn init_one(
        &self,
        registration: &Registration,
        plugins: &PluginSet,
    ) -> Result<(Instance, Meta, Option<Value>)> {
        let key = registration.key();
        let mut ic = InitContext::new(
            registration,
            plugins,
            &self.properties,
            self.cancellation.child_token(),
        );

        // A null entry means no override
        let overrides = self
            .overrides
            .get(&key.to_string())
            .filter(|value| !value.is_null());
        if let Some(overrides) = overrides {
            debug!(key = %key, "Merging configuration override");
            ic.merge_config(overrides)?;
        }

        let instance = {
            let init = registration.init().init(&mut ic);
            let body = async {
                let result = match self.init_timeout {
                    Some(after) => match tokio::time::timeout(after, init).await {
                        Ok(result) => result,
                        Err(_) => {
                            return Err(HostError::Timeout {
                                key: key.clone(),
                                after,
                            })
                        }
                    },
                    None => init.await,
                };
                result.map_err(|source| HostError::InitializationFailure {
                    key: key.clone(),
                    source: Arc::new(source),
                })
            };

            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Err(HostError::Cancelled { key: key.clone() }),
                result = body => result,
            }?
        };

        let (config, meta) = ic.into_parts();
        let config = config.and_then(|c| match c.to_value() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Could not snapshot plugin configuration");
                None
            }
        });

        Ok((instance, meta, config))
    }

    /// Attach a request handler when the registration has the serving type
    fn attach_handler(
        &self,
        registration: &Registration,
        instance: &Instance,
        initialized: &mut Initialized,
    ) -> Result<()> {
        let key = registration.key();

        if registration.plugin_type != self.serving_type {
            if instance.as_request_handler().is_some() {
                debug!(key = %key, "Request handler outside the serving type is not attached");
            }
            return Ok(());
        }

        let Some(router) = instance.as_request_handler() else {
            warn!(key = %key, "Serving plugin does not expose a request handler");
            return Ok(());
        };

        if initialized.handler.is_some() {
            return Err(HostError::RouteConflict {
                route: ROOT_ROUTE.to_string(),
                key,
            });
        }

        info!(key = %key, route = ROOT_ROUTE, "Attached request handler");
        initialized.handler = Some((key, router.clone()));
        Ok(())
    }

    fn warn_unmatched_overrides(&self) {
        for name in self.overrides.keys() {
            let known = PluginKey::parse(name)
                .map(|key| self.registry.get(&key).is_some())
                .unwrap_or(false);
            if !known {
                warn!(key = %name, "Configuration override does not match any registered plugin");
            }
        }
    }
}

/// Keep a failed registration in the plugin set
///
/// The set stores the plugin's own error, so `Plugin::instance` wraps it
/// exactly once.
fn record_failure(key: &PluginKey, error: &HostError, initialized: &mut Initialized) {
    initialized.states.insert(key.clone(), PluginState::Failed);

    let cause = match error {
        HostError::InitializationFailure { source, .. } => source.clone(),
        other => Arc::new(other.clone()),
    };
    let failed = Plugin::new(key.clone(), Meta::default(), None, Err(cause));
    if let Err(e) = initialized.plugins.add(failed) {
        warn!(key = %key, error = %e, "Failure not recorded");
    }
}
