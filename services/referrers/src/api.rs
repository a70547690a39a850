//! API server builder and router

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::RegistryResult;
use crate::extension::{Extension, ExtensionRegistry};
use crate::repository::Registry;

/// Registry builder for configuring and creating the registry service
#[derive(Debug)]
pub struct RegistryBuilder {
    storage: storage::Storage,
    extensions: Vec<Arc<dyn Extension>>,
    shutdown: CancellationToken,
}

impl RegistryBuilder {
    /// Start building a registry over `storage`
    pub fn new(storage: storage::Storage) -> Self {
        Self {
            storage,
            extensions: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Enable an extension. Extensions contribute handlers and routes in the
    /// order they are added.
    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Enable every extension named in `config`, built from `available`
    pub fn extensions_from_config(
        mut self,
        available: &ExtensionRegistry,
        config: &BTreeMap<String, serde_json::Value>,
    ) -> RegistryResult<Self> {
        for (name, options) in config {
            self.extensions.push(available.get(name, options)?);
        }
        Ok(self)
    }

    /// Cancel every in-flight request once `token` is cancelled
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// The shared registry state, without routes
    pub fn registry(&self) -> Registry {
        Registry::new(self.storage.clone(), self.extensions.clone())
            .with_shutdown(self.shutdown.clone())
    }

    /// Build the registry service
    ///
    /// Returns a Router that can be served with any tower-compatible server
    pub fn build(self) -> Router {
        let registry = self.registry();

        let mut router = Router::new()
            .route("/v2/", get(api_version_check))
            .merge(crate::blob::router())
            .merge(crate::manifest::router());

        for extension in registry.extensions() {
            for route in extension.repository_routes() {
                tracing::debug!(
                    extension = extension.name(),
                    path = %route.path(),
                    "mounting extension route"
                );
                router = router.route(&route.path(), route.handler);
            }
        }

        router.with_state(registry)
    }
}

/// API version check endpoint
///
/// Returns 200 OK to indicate the registry is available
async fn api_version_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({})))
}

#[cfg(test)]
mod tests {
    use storage::MemoryDriver;

    use super::*;

    #[test]
    fn test_builder() {
        let mut config = BTreeMap::new();
        config.insert("oras".to_string(), json!({ "artifacts": ["referrers"] }));

        let builder = RegistryBuilder::new(MemoryDriver::new().into())
            .extensions_from_config(&ExtensionRegistry::with_defaults(), &config)
            .unwrap();
        assert_eq!(builder.registry().extensions().len(), 1);
        let _router = builder.build();
    }

    #[test]
    fn test_shutdown_cancels_request_contexts() {
        let shutdown = CancellationToken::new();
        let registry = RegistryBuilder::new(MemoryDriver::new().into())
            .shutdown(shutdown.clone())
            .registry();
        let ctx = registry.request_context();

        shutdown.cancel();
        assert!(matches!(
            ctx.check(),
            Err(crate::error::RegistryError::Cancelled)
        ));
    }

    #[test]
    fn test_unknown_extension_in_config() {
        let mut config = BTreeMap::new();
        config.insert("nope".to_string(), serde_json::Value::Null);
        assert!(
            RegistryBuilder::new(MemoryDriver::new().into())
                .extensions_from_config(&ExtensionRegistry::with_defaults(), &config)
                .is_err()
        );
    }
}
