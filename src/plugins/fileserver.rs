//! Static file server plugin
//!
//! Registers `http.handler/fileserver`. It requires a `storage.fs` plugin,
//! takes the single initialized one and serves its directory as static
//! files from the root route.

use axum::Router;
use tower_http::services::ServeDir;
use tracing::info;

use crate::core::error::Result;
use crate::plugin::{
    init_fn, Instance, PluginRegistry, PluginType, Registration, HTTP_HANDLER, STORAGE_FS,
};
use crate::plugins::fs::LocalFs;

pub const ID: &str = "fileserver";

/// Register the file server plugin
pub fn register(registry: &mut PluginRegistry) -> Result<()> {
    registry.register(
        Registration::new(
            HTTP_HANDLER,
            ID,
            init_fn(|ic| {
                let fs = ic.get_single_as::<LocalFs>(&PluginType::new(STORAGE_FS))?;
                info!(key = %ic.key(), root = %fs.root().display(), "Building static file handler");
                Ok(Instance::request_handler(file_router(&fs)))
            }),
        )
        .requires_mandatory(STORAGE_FS),
    )
}

/// Router serving every file under the filesystem root
///
/// `ServeDir` refuses `..` components, so requests cannot leave the root.
pub fn file_router(fs: &LocalFs) -> Router {
    Router::new().fallback_service(ServeDir::new(fs.root()))
}
