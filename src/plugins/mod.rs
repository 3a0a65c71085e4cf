//! Built-in plugins
//!
//! Each plugin module exposes a `register` function. [`bootstrap`] is the
//! explicit list the host binary registers at startup.

pub mod fileserver;
pub mod fs;

pub use fs::{FsConfig, LocalFs};

use crate::core::error::Result;
use crate::plugin::PluginRegistry;

/// Build the registry holding every built-in plugin
pub fn bootstrap() -> Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    fs::register(&mut registry)?;
    fileserver::register(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HostError;
    use crate::plugin::{Driver, PluginKey, PluginState, HTTP_HANDLER, STORAGE_FS};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[test]
    fn test_bootstrap_registers_builtins() {
        let registry = bootstrap().unwrap();
        assert_eq!(registry.len(), 2);

        let resolution = registry.graph(|_| false).unwrap();
        assert_eq!(
            resolution.keys(),
            vec![
                PluginKey::new(STORAGE_FS, fs::ID),
                PluginKey::new(HTTP_HANDLER, fileserver::ID),
            ]
        );
    }

    #[test]
    fn test_bootstrap_twice_into_one_registry_is_rejected() {
        let mut registry = bootstrap().unwrap();
        let err = fs::register(&mut registry).unwrap_err();
        assert!(matches!(err, HostError::DuplicateRegistration { .. }));
    }

    #[tokio::test]
    async fn test_end_to_end_file_serving() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello from disk").unwrap();

        let initialized = Driver::new(bootstrap().unwrap())
            .with_override("storage.fs/local", json!({ "public": dir.path() }))
            .run()
            .await
            .unwrap();

        let fs_key = PluginKey::new(STORAGE_FS, fs::ID);
        let server_key = PluginKey::new(HTTP_HANDLER, fileserver::ID);
        let order: Vec<_> = initialized.plugins.iter().map(|p| p.key().clone()).collect();
        assert_eq!(order, vec![fs_key.clone(), server_key.clone()]);
        assert_eq!(initialized.states.get(&server_key), Some(&PluginState::Initialized));

        let (handler_key, router) = initialized.handler.unwrap();
        assert_eq!(handler_key, server_key);

        let response = router
            .oneshot(Request::builder().uri("/hello.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello from disk");
    }

    #[tokio::test]
    async fn test_disabling_storage_stops_startup() {
        let err = Driver::new(bootstrap().unwrap())
            .disable(STORAGE_FS)
            .run()
            .await
            .unwrap_err();

        match err {
            HostError::UnsatisfiedRequirement { key, required } => {
                assert_eq!(key, PluginKey::new(HTTP_HANDLER, fileserver::ID));
                assert_eq!(required.as_str(), STORAGE_FS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disabling_file_server_keeps_storage() {
        let initialized = Driver::new(bootstrap().unwrap())
            .disable("http.handler/fileserver")
            .run()
            .await
            .unwrap();

        assert!(initialized.handler.is_none());
        assert_eq!(initialized.plugins.len(), 1);
        assert_eq!(
            initialized
                .states
                .get(&PluginKey::new(HTTP_HANDLER, fileserver::ID)),
            Some(&PluginState::Skipped)
        );
    }
}
