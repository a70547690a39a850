//! Registry extensions
//!
//! An extension contributes manifest handlers to every repository and mounts
//! routes below `/v2/{name}/_{namespace}/{extension}/{component}`.
//! Extensions are built by name from an [`ExtensionRegistry`], which is an
//! ordinary value assembled at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::routing::MethodRouter;

use crate::error::{RegistryError, RegistryResult};
use crate::manifests::ManifestHandler;
use crate::oras::OrasExtension;
use crate::repository::{Registry, Repository};

/// A named set of behaviours layered onto every repository
pub trait Extension: fmt::Debug + Send + Sync {
    /// The name the extension is configured under
    fn name(&self) -> &str;

    /// Manifest handlers to add to `repository`'s dispatch, after the built-in ones
    fn manifest_handlers(&self, repository: &Repository) -> Vec<Arc<dyn ManifestHandler>>;

    /// Routes to mount for every repository
    fn repository_routes(&self) -> Vec<ExtendedRoute>;
}

/// A route contributed by an extension
pub struct ExtendedRoute {
    /// Namespace segment, mounted as `_{namespace}`
    pub namespace: String,
    /// Extension segment
    pub extension: String,
    /// Component segment
    pub component: String,
    /// Method handlers for the route
    pub handler: MethodRouter<Registry>,
}

impl fmt::Debug for ExtendedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedRoute")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

impl ExtendedRoute {
    /// The axum route path, with `{name}` capturing the repository name
    pub fn path(&self) -> String {
        format!(
            "/v2/{{name}}/_{}/{}/{}",
            self.namespace, self.extension, self.component
        )
    }
}

/// Builds an extension from its configuration options
pub type ExtensionFactory = fn(&serde_json::Value) -> RegistryResult<Arc<dyn Extension>>;

/// Named extension constructors
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    factories: BTreeMap<String, ExtensionFactory>,
}

impl ExtensionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the bundled extensions (`oras`)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            crate::oras::NAME.to_string(),
            OrasExtension::from_options as ExtensionFactory,
        );
        registry
    }

    /// Register a constructor under `name`. Names are unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: ExtensionFactory,
    ) -> RegistryResult<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Extension(format!(
                "extension {name:?} is already registered"
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Construct the extension registered as `name`
    pub fn get(
        &self,
        name: &str,
        options: &serde_json::Value,
    ) -> RegistryResult<Arc<dyn Extension>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::Extension(format!("unknown extension {name:?}")))?;
        tracing::debug!(extension = name, "constructing extension");
        factory(options)
    }

    /// Registered extension names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
