//! Registry and repository handles

use std::fmt;
use std::sync::Arc;

use storage::Storage;
use tokio_util::sync::CancellationToken;

use crate::blobs::{BlobStore, LinkedBlobStore};
use crate::context::RequestContext;
use crate::error::{RegistryError, RegistryResult};
use crate::extension::Extension;
use crate::index::ReferrersIndex;
use crate::link::LinkStore;
use crate::manifests::image::ImageManifestHandler;
use crate::manifests::{ManifestDispatcher, ManifestHandler, ManifestStore};
use crate::paths;

/// Shared registry state: the storage backend and the active extensions.
///
/// This is the axum router state; cloning is cheap.
#[derive(Clone)]
pub struct Registry {
    storage: Storage,
    extensions: Arc<[Arc<dyn Extension>]>,
    shutdown: CancellationToken,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("storage", &self.storage.name())
            .field(
                "extensions",
                &self.extensions.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl Registry {
    /// Create a registry over `storage` with the given extensions active
    pub fn new(storage: Storage, extensions: Vec<Arc<dyn Extension>>) -> Self {
        Self {
            storage,
            extensions: extensions.into(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel in-flight requests when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// A context for one request, cancelled on shutdown
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_token(self.shutdown.child_token())
    }

    /// The active extensions, in registration order
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// Open the repository called `name`
    pub fn repository(&self, name: &str) -> RegistryResult<Repository> {
        validate_name(name)?;
        Ok(Repository {
            name: name.into(),
            storage: self.storage.clone(),
            extensions: self.extensions.clone(),
        })
    }
}

fn validate_name(name: &str) -> RegistryResult<()> {
    if !name.is_empty() && name.split('/').all(valid_component) {
        Ok(())
    } else {
        Err(RegistryError::InvalidRepository(name.to_string()))
    }
}

/// Matches `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`
fn valid_component(component: &str) -> bool {
    let alphanumeric = |b: u8| matches!(b, b'a'..=b'z' | b'0'..=b'9');
    let bytes = component.as_bytes();
    let mut at = 0;
    loop {
        let run = at;
        while at < bytes.len() && alphanumeric(bytes[at]) {
            at += 1;
        }
        if at == run {
            return false;
        }
        if at == bytes.len() {
            return true;
        }

        let separator = at;
        while at < bytes.len() && !alphanumeric(bytes[at]) {
            at += 1;
        }
        match &component[separator..at] {
            "." | "_" | "__" => {}
            dashes if dashes.bytes().all(|b| b == b'-') => {}
            _ => return false,
        }
    }
}

/// One named repository. Every store it hands out is built on demand and
/// holds no state besides the storage handle.
#[derive(Clone)]
pub struct Repository {
    name: Arc<str>,
    storage: Storage,
    extensions: Arc<[Arc<dyn Extension>]>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// The repository name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The global blob store
    pub fn blob_store(&self) -> BlobStore {
        BlobStore::new(self.storage.clone())
    }

    /// The link store over this repository's storage
    pub fn links(&self) -> LinkStore {
        LinkStore::new(self.storage.clone())
    }

    /// Blobs (layers and configs) uploaded to this repository
    pub fn blobs(&self) -> LinkedBlobStore {
        LinkedBlobStore::new(self.blob_store(), self.links(), paths::layers(&self.name))
    }

    /// Manifest payloads stored in this repository
    pub fn manifest_blobs(&self) -> LinkedBlobStore {
        LinkedBlobStore::new(
            self.blob_store(),
            self.links(),
            paths::manifest_revisions(&self.name),
        )
    }

    /// The referrers index
    pub fn referrers_index(&self) -> ReferrersIndex {
        ReferrersIndex::new(self.links())
    }

    /// The manifest handlers active for this repository, in dispatch order.
    ///
    /// Image manifests come first; extension handlers follow in extension
    /// registration order.
    pub fn manifest_handlers(&self) -> Vec<Arc<dyn ManifestHandler>> {
        let mut handlers: Vec<Arc<dyn ManifestHandler>> =
            vec![Arc::new(ImageManifestHandler::new(self.clone()))];
        for extension in self.extensions.iter() {
            handlers.extend(extension.manifest_handlers(self));
        }
        handlers
    }

    /// The manifest service for this repository
    pub fn manifests(&self) -> ManifestStore {
        ManifestStore::new(
            self.manifest_blobs(),
            ManifestDispatcher::new(self.manifest_handlers()),
        )
    }
}
