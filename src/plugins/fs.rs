//! Directory-backed filesystem plugin
//!
//! Registers `storage.fs/local`, a handle on one directory. The
//! directory is taken from the plugin's `public` setting and exported under
//! the same name so later plugins can see where files are served from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::error::{ErrorContext, HostError, Result};
use crate::plugin::{InitContext, Instance, PluginInit, PluginRegistry, Registration, STORAGE_FS};

pub const ID: &str = "local";

/// Directory used when no override is configured
pub const DEFAULT_PUBLIC_DIR: &str = "/var/www/plugin-host-default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsConfig {
    /// Directory the view is rooted at
    pub public: PathBuf,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            public: PathBuf::from(DEFAULT_PUBLIC_DIR),
        }
    }
}

/// Handle on the directory tree a `storage.fs` plugin provides
///
/// Consumers serve it read-only; nothing here writes below the root.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Init body of `storage.fs/local`
pub struct LocalFsInit;

#[async_trait]
impl PluginInit for LocalFsInit {
    async fn init(&self, ic: &mut InitContext<'_>) -> Result<Instance> {
        let public = ic.config::<FsConfig>()?.public.clone();

        match tokio::fs::metadata(&public).await {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(HostError::Plugin(format!(
                    "public path is not a directory: {}",
                    public.display()
                )));
            }
            Ok(_) => {}
            // Opened lazily by the consumer, so it may appear later
            Err(e) if e.kind() == ErrorKind::NotFound => warn!(
                key = %ic.key(),
                public = %public.display(),
                "Public directory does not exist yet"
            ),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to inspect {}", public.display()));
            }
        }

        ic.meta
            .exports
            .insert("public".to_string(), public.display().to_string());
        info!(key = %ic.key(), public = %public.display(), "Serving files from directory");

        Ok(Instance::new(LocalFs::new(public)))
    }
}

/// Register the filesystem plugin
pub fn register(registry: &mut PluginRegistry) -> Result<()> {
    registry.register(
        Registration::new(STORAGE_FS, ID, LocalFsInit).with_config(FsConfig::default()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Driver, PluginKey, PluginType};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_plugin_uses_override_and_exports_public() {
        let dir = TempDir::new().unwrap();
        let mut registry = PluginRegistry::new();
        register(&mut registry).unwrap();

        let initialized = Driver::new(registry)
            .with_override("storage.fs/local", json!({ "public": dir.path() }))
            .run()
            .await
            .unwrap();

        let plugin = initialized
            .plugins
            .get(&PluginKey::new(STORAGE_FS, ID))
            .unwrap();
        assert_eq!(
            plugin.meta().exports.get("public"),
            Some(&dir.path().display().to_string())
        );

        let fs = plugin.instance().unwrap().downcast::<LocalFs>().unwrap();
        assert_eq!(fs.root(), dir.path());
    }

    #[tokio::test]
    async fn test_plugin_default_directory() {
        let mut registry = PluginRegistry::new();
        register(&mut registry).unwrap();

        let initialized = Driver::new(registry).run().await.unwrap();

        let fs = initialized
            .plugins
            .get_single(&PluginType::new(STORAGE_FS))
            .unwrap()
            .downcast::<LocalFs>()
            .unwrap();
        assert_eq!(fs.root(), Path::new(DEFAULT_PUBLIC_DIR));
    }

    #[tokio::test]
    async fn test_plugin_rejects_file_as_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let mut registry = PluginRegistry::new();
        register(&mut registry).unwrap();

        let err = Driver::new(registry)
            .with_override("storage.fs/local", json!({ "public": file }))
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), "InitializationFailure");
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("later");

        let mut registry = PluginRegistry::new();
        register(&mut registry).unwrap();

        let initialized = Driver::new(registry)
            .with_override("storage.fs/local", json!({ "public": &missing }))
            .run()
            .await
            .unwrap();

        let fs = initialized
            .plugins
            .get_single(&PluginType::new(STORAGE_FS))
            .unwrap()
            .downcast::<LocalFs>()
            .unwrap();
        assert_eq!(fs.root(), missing.as_path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_uninspectable_directory_fails_init() {
        let dir = TempDir::new().unwrap();
        // A path through a regular file cannot be inspected
        let file = dir.path().join("plain");
        std::fs::write(&file, "x").unwrap();
        let blocked = file.join("public");

        let mut registry = PluginRegistry::new();
        register(&mut registry).unwrap();

        let err = Driver::new(registry)
            .with_override("storage.fs/local", json!({ "public": blocked }))
            .run()
            .await
            .unwrap_err();

        match err {
            HostError::InitializationFailure { source, .. } => match &*source {
                HostError::Plugin(msg) => assert!(msg.starts_with("Failed to inspect")),
                other => panic!("unexpected cause: {other:?}"),
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
