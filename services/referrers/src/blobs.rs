//! Content-addressed blob storage
//!
//! [`BlobStore`] holds the bytes of every blob once, keyed by digest.
//! [`LinkedBlobStore`] scopes a blob store to a link root, so a repository
//! only sees blobs that were linked into it.

use bytes::Bytes;
use camino::Utf8PathBuf;
use storage::Storage;

use crate::context::RequestContext;
use crate::descriptor::{Descriptor, OCTET_STREAM};
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::link::LinkStore;
use crate::paths;

/// Global digest-keyed blob storage
#[derive(Debug, Clone)]
pub struct BlobStore {
    storage: Storage,
}

impl BlobStore {
    /// Create a blob store
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Store `content` under its sha256 digest.
    ///
    /// Storing content that is already present rewrites identical bytes at
    /// the same key.
    #[tracing::instrument(skip_all, fields(size = content.len()))]
    pub async fn put(&self, ctx: &RequestContext, content: Bytes) -> RegistryResult<(Digest, i64)> {
        let digest = Digest::from_bytes(&content);
        let size = content.len() as i64;
        let path = paths::blob_data(&digest);

        ctx.guard(self.storage.put_content(&path, content)).await?;
        tracing::debug!(%digest, size, "stored blob");
        Ok((digest, size))
    }

    /// Read a blob's bytes
    pub async fn get(&self, ctx: &RequestContext, digest: &Digest) -> RegistryResult<Bytes> {
        ctx.guard(self.storage.get_content(&paths::blob_data(digest)))
            .await
            .map_err(|err| not_found_as(err, || RegistryError::BlobUnknown(digest.clone())))
    }

    /// Describe a stored blob. The media type is not recorded, so it is
    /// always reported as `application/octet-stream`.
    pub async fn stat(&self, ctx: &RequestContext, digest: &Digest) -> RegistryResult<Descriptor> {
        let meta = ctx
            .guard(self.storage.stat(&paths::blob_data(digest)))
            .await
            .map_err(|err| not_found_as(err, || RegistryError::BlobUnknown(digest.clone())))?;
        Ok(Descriptor::new(OCTET_STREAM, digest.clone(), meta.size as i64))
    }
}

fn not_found_as(err: RegistryError, replacement: impl FnOnce() -> RegistryError) -> RegistryError {
    match err {
        RegistryError::Storage(ref inner) if inner.is_not_found() => replacement(),
        other => other,
    }
}

/// A blob store visible only through links under one root
#[derive(Debug, Clone)]
pub struct LinkedBlobStore {
    blobs: BlobStore,
    links: LinkStore,
    root: Utf8PathBuf,
}

impl LinkedBlobStore {
    /// Scope `blobs` to the links below `root`
    pub fn new(blobs: BlobStore, links: LinkStore, root: Utf8PathBuf) -> Self {
        Self { blobs, links, root }
    }

    /// Store `content` and link it into this store's root
    pub async fn put(
        &self,
        ctx: &RequestContext,
        media_type: &str,
        content: Bytes,
    ) -> RegistryResult<Descriptor> {
        let (digest, size) = self.blobs.put(ctx, content).await?;
        let descriptor = Descriptor::new(media_type, digest, size);
        self.links.link_blob(ctx, &self.root, &descriptor).await?;
        Ok(descriptor)
    }

    /// Describe a linked blob. Unlinked or missing blobs are [`RegistryError::BlobUnknown`].
    pub async fn stat(&self, ctx: &RequestContext, digest: &Digest) -> RegistryResult<Descriptor> {
        let target = self
            .links
            .read_link(ctx, &self.root, digest)
            .await
            .map_err(|err| not_found_as(err, || RegistryError::BlobUnknown(digest.clone())))?;
        self.blobs.stat(ctx, &target).await
    }

    /// Read a linked blob's bytes
    pub async fn get(&self, ctx: &RequestContext, digest: &Digest) -> RegistryResult<Bytes> {
        let target = self
            .links
            .read_link(ctx, &self.root, digest)
            .await
            .map_err(|err| not_found_as(err, || RegistryError::BlobUnknown(digest.clone())))?;
        self.blobs.get(ctx, &target).await
    }
}

#[cfg(test)]
mod tests {
    use storage::MemoryDriver;

    use super::*;

    fn stores() -> (BlobStore, LinkStore) {
        let storage: Storage = MemoryDriver::new().into();
        (BlobStore::new(storage.clone()), LinkStore::new(storage))
    }

    #[tokio::test]
    async fn test_blob_put_and_stat() {
        let (blobs, _) = stores();
        let ctx = RequestContext::new();

        let (digest, size) = blobs.put(&ctx, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(digest, Digest::from_bytes(b"hello"));
        assert_eq!(size, 5);

        let desc = blobs.stat(&ctx, &digest).await.unwrap();
        assert_eq!(desc.media_type, OCTET_STREAM);
        assert_eq!(desc.size, 5);
        assert_eq!(blobs.get(&ctx, &digest).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_missing_blob_is_unknown() {
        let (blobs, _) = stores();
        let ctx = RequestContext::new();
        let digest = Digest::from_bytes(b"absent");
        assert!(matches!(
            blobs.stat(&ctx, &digest).await,
            Err(RegistryError::BlobUnknown(d)) if d == digest
        ));
    }

    #[tokio::test]
    async fn test_linked_store_only_sees_its_links() {
        let (blobs, links) = stores();
        let ctx = RequestContext::new();
        let one = LinkedBlobStore::new(blobs.clone(), links.clone(), "one".into());
        let two = LinkedBlobStore::new(blobs, links, "two".into());

        let desc = one
            .put(&ctx, "application/json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(desc.media_type, "application/json");
        assert_eq!(one.stat(&ctx, &desc.digest).await.unwrap().size, 2);
        assert_eq!(one.get(&ctx, &desc.digest).await.unwrap(), "{}");
        assert!(matches!(
            two.stat(&ctx, &desc.digest).await,
            Err(RegistryError::BlobUnknown(_))
        ));
    }
}
