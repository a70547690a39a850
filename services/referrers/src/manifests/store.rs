use bytes::Bytes;

use super::{Manifest, ManifestDispatcher};
use crate::blobs::LinkedBlobStore;
use crate::context::RequestContext;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};

/// A repository's manifests: revision-linked payloads plus dispatch
#[derive(Debug, Clone)]
pub struct ManifestStore {
    blobs: LinkedBlobStore,
    dispatcher: ManifestDispatcher,
}

impl ManifestStore {
    /// Serve manifests stored in `blobs` through `dispatcher`
    pub fn new(blobs: LinkedBlobStore, dispatcher: ManifestDispatcher) -> Self {
        Self { blobs, dispatcher }
    }

    /// Whether a manifest revision is stored in this repository
    pub async fn exists(&self, ctx: &RequestContext, digest: &Digest) -> RegistryResult<bool> {
        match self.blobs.stat(ctx, digest).await {
            Ok(_) => Ok(true),
            Err(RegistryError::BlobUnknown(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Fetch and parse a stored manifest
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get(&self, ctx: &RequestContext, digest: &Digest) -> RegistryResult<Manifest> {
        let content = self.blobs.get(ctx, digest).await.map_err(|err| match err {
            RegistryError::BlobUnknown(_) => RegistryError::ManifestUnknown(digest.clone()),
            other => other,
        })?;
        self.dispatcher.unmarshal(ctx, digest, content, None).await
    }

    /// Parse client-supplied manifest content
    pub async fn unmarshal(
        &self,
        ctx: &RequestContext,
        digest: &Digest,
        content: Bytes,
        media_type: Option<&str>,
    ) -> RegistryResult<Manifest> {
        self.dispatcher
            .unmarshal(ctx, digest, content, media_type)
            .await
    }

    /// Verify and store a manifest, returning its digest
    pub async fn put(
        &self,
        ctx: &RequestContext,
        manifest: &Manifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        self.dispatcher
            .put(ctx, manifest, skip_dependency_verification)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_unknown_manifest() {
        let (_, registry) = testing::registry();
        let manifests = registry.repository("app").unwrap().manifests();
        let ctx = RequestContext::new();
        let digest = Digest::from_bytes(b"missing");

        assert!(!manifests.exists(&ctx, &digest).await.unwrap());
        assert!(matches!(
            manifests.get(&ctx, &digest).await,
            Err(RegistryError::ManifestUnknown(d)) if d == digest
        ));
    }

    #[tokio::test]
    async fn test_manifests_are_scoped_to_repository() {
        let (_, registry) = testing::registry();
        let ctx = RequestContext::new();
        let app = registry.repository("app").unwrap();
        let other = registry.repository("other").unwrap();

        let digest = testing::push_image(&app, &ctx, b"layer").await;
        assert!(app.manifests().exists(&ctx, &digest).await.unwrap());
        assert!(!other.manifests().exists(&ctx, &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_stored_payload_is_verbatim() {
        let (_, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let subject = testing::push_image(&repo, &ctx, b"layer").await;
        let content = testing::artifact_manifest("sbom", &subject, &[]);

        let manifests = repo.manifests();
        let manifest = manifests
            .unmarshal(&ctx, &Digest::from_bytes(&content), content.clone(), None)
            .await
            .unwrap();
        let digest = manifests.put(&ctx, &manifest, false).await.unwrap();

        let stored = manifests.get(&ctx, &digest).await.unwrap();
        assert_eq!(stored.payload(), &content);
        assert_eq!(stored.as_artifact().unwrap().artifact_type(), "sbom");
    }
}
