//! Fixtures shared by unit tests

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use storage::{Driver, MemoryDriver, Metadata, Storage, StorageError, StorageErrorKind};

use crate::context::RequestContext;
use crate::digest::Digest;
use crate::extension::Extension;
use crate::manifests::{ARTIFACT_MANIFEST, OCI_IMAGE_MANIFEST};
use crate::oras::{OrasExtension, OrasOptions};
use crate::repository::{Registry, Repository};

/// A registry over fresh memory storage with ORAS referrers enabled
pub(crate) fn registry() -> (Storage, Registry) {
    with_storage(MemoryDriver::new().into())
}

/// Like [`registry`], but `stat` fails with an I/O error for keys under `prefix`
pub(crate) fn faulty_registry(prefix: &str) -> (Storage, Registry) {
    with_storage(
        FaultyDriver {
            inner: MemoryDriver::new(),
            stat_prefix: prefix.into(),
        }
        .into(),
    )
}

fn with_storage(storage: Storage) -> (Storage, Registry) {
    let oras: Arc<dyn Extension> = Arc::new(OrasExtension::new(OrasOptions::referrers()));
    let registry = Registry::new(storage.clone(), vec![oras]);
    (storage, registry)
}

/// An artifact manifest document
pub(crate) fn artifact_manifest(artifact_type: &str, subject: &Digest, blobs: &[&Digest]) -> Bytes {
    let blobs: Vec<_> = blobs
        .iter()
        .map(|digest| {
            serde_json::json!({
                "mediaType": "application/octet-stream",
                "digest": digest,
                "size": 1,
            })
        })
        .collect();
    Bytes::from(
        serde_json::json!({
            "mediaType": ARTIFACT_MANIFEST,
            "artifactType": artifact_type,
            "blobs": blobs,
            "subject": {
                "mediaType": OCI_IMAGE_MANIFEST,
                "digest": subject,
                "size": 1,
            },
            "annotations": { "purpose": "test" },
        })
        .to_string(),
    )
}

/// An OCI image manifest document
pub(crate) fn image_manifest(config: &Digest, layers: &[&Digest]) -> Bytes {
    let layers: Vec<_> = layers
        .iter()
        .map(|digest| {
            serde_json::json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar",
                "digest": digest,
                "size": 1,
            })
        })
        .collect();
    Bytes::from(
        serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_MANIFEST,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config,
                "size": 2,
            },
            "layers": layers,
        })
        .to_string(),
    )
}

/// Upload a config and one layer, then store an image manifest over them
pub(crate) async fn push_image(
    repository: &Repository,
    ctx: &RequestContext,
    layer: &[u8],
) -> Digest {
    let blobs = repository.blobs();
    let config = blobs
        .put(ctx, "application/vnd.oci.image.config.v1+json", Bytes::from_static(b"{}"))
        .await
        .unwrap();
    let layer = blobs
        .put(ctx, "application/octet-stream", Bytes::copy_from_slice(layer))
        .await
        .unwrap();

    let content = image_manifest(&config.digest, &[&layer.digest]);
    let manifests = repository.manifests();
    let manifest = manifests
        .unmarshal(ctx, &Digest::from_bytes(&content), content, None)
        .await
        .unwrap();
    manifests.put(ctx, &manifest, false).await.unwrap()
}

#[derive(Debug)]
struct FaultyDriver {
    inner: MemoryDriver,
    stat_prefix: Utf8PathBuf,
}

#[async_trait]
impl Driver for FaultyDriver {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn get_content(&self, path: &Utf8Path) -> Result<Bytes, StorageError> {
        self.inner.get_content(path).await
    }

    async fn put_content(&self, path: &Utf8Path, content: Bytes) -> Result<(), StorageError> {
        self.inner.put_content(path, content).await
    }

    async fn stat(&self, path: &Utf8Path) -> Result<Metadata, StorageError> {
        if path.starts_with(&self.stat_prefix) {
            return Err(StorageError::builder(
                self.name(),
                StorageErrorKind::Io,
                std::io::Error::other("disk on fire"),
            )
            .path(path.as_str())
            .build());
        }
        self.inner.stat(path).await
    }

    async fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        self.inner.walk(root).await
    }

    async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError> {
        self.inner.delete(path).await
    }
}
