//! Artifact manifests
//!
//! An artifact manifest describes some content (`blobs`) that is *about*
//! another manifest (its `subject`), e.g. a signature or an SBOM for an image.
//! Storing one records it in the referrers index under its subject.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use super::{ARTIFACT_MANIFEST, Manifest, ManifestHandler, ManifestKind};
use crate::context::RequestContext;
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult, VerificationError};
use crate::repository::Repository;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactManifestDocument {
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    artifact_type: Option<String>,
    #[serde(default)]
    blobs: Vec<Descriptor>,
    #[serde(default)]
    subject: Option<Descriptor>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

/// A parsed artifact manifest and the exact bytes it came from
#[derive(Debug, Clone)]
pub struct ArtifactManifest {
    artifact_type: String,
    blobs: Vec<Descriptor>,
    subject: Descriptor,
    annotations: BTreeMap<String, String>,
    payload: Bytes,
}

impl ArtifactManifest {
    /// Parse an artifact manifest.
    ///
    /// Content that is not an artifact manifest document is
    /// [`RegistryError::ManifestFormatUnsupported`]. A document without an
    /// `artifactType` (or with an empty one) or without a `subject` is
    /// [`RegistryError::MissingField`].
    pub fn from_bytes(payload: Bytes) -> RegistryResult<Self> {
        let document: ArtifactManifestDocument = serde_json::from_slice(&payload)
            .map_err(|err| {
                tracing::debug!(%err, "not an artifact manifest");
                RegistryError::ManifestFormatUnsupported
            })?;

        if document
            .media_type
            .as_deref()
            .is_some_and(|media_type| media_type != ARTIFACT_MANIFEST)
        {
            return Err(RegistryError::ManifestFormatUnsupported);
        }

        let artifact_type = document
            .artifact_type
            .filter(|artifact_type| !artifact_type.is_empty())
            .ok_or(RegistryError::MissingField("artifactType"))?;
        let subject = document
            .subject
            .ok_or(RegistryError::MissingField("subject"))?;

        Ok(Self {
            artifact_type,
            blobs: document.blobs,
            subject,
            annotations: document.annotations,
            payload,
        })
    }

    /// The artifact's declared type
    pub fn artifact_type(&self) -> &str {
        &self.artifact_type
    }

    /// Content this manifest depends on, in document order
    pub fn blobs(&self) -> &[Descriptor] {
        &self.blobs
    }

    /// The manifest this artifact is about
    pub fn subject(&self) -> &Descriptor {
        &self.subject
    }

    /// Free-form annotations
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// The verbatim bytes this manifest was parsed from
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Always [`ARTIFACT_MANIFEST`]
    pub fn media_type(&self) -> &str {
        ARTIFACT_MANIFEST
    }
}

/// Stores artifact manifests and indexes them by subject
#[derive(Debug, Clone)]
pub struct ArtifactManifestHandler {
    repository: Repository,
}

impl ArtifactManifestHandler {
    /// Handle artifact manifests for `repository`
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Check that the manifest is acceptable to store.
    ///
    /// Every failure is collected so the client sees all of them at once.
    /// Dependency checks (blobs and subject) are skipped on request; policy
    /// checks are not.
    async fn verify(
        &self,
        ctx: &RequestContext,
        manifest: &ArtifactManifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<()> {
        let mut errors = Vec::new();

        if manifest.artifact_type().is_empty() {
            errors.push(VerificationError::ManifestInvalid {
                reason: "artifactType invalid".into(),
            });
        }

        if !skip_dependency_verification {
            let blobs = self.repository.blobs();
            for blob in manifest.blobs() {
                match blobs.stat(ctx, &blob.digest).await {
                    Ok(_) => {}
                    Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled),
                    Err(err) => {
                        if !matches!(err, RegistryError::BlobUnknown(_)) {
                            tracing::debug!(digest = %blob.digest, %err, "blob stat failed");
                        }
                        errors.push(VerificationError::BlobUnknown {
                            digest: blob.digest.clone(),
                        });
                    }
                }
            }

            let subject = &manifest.subject().digest;
            match self.repository.manifests().exists(ctx, subject).await {
                Ok(true) => {}
                Ok(false) => errors.push(VerificationError::BlobUnknown {
                    digest: subject.clone(),
                }),
                Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled),
                Err(err) => {
                    tracing::debug!(digest = %subject, %err, "subject lookup failed");
                    errors.push(VerificationError::BlobUnknown {
                        digest: subject.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::ManifestInvalid(errors))
        }
    }
}

#[async_trait]
impl ManifestHandler for ArtifactManifestHandler {
    fn kind(&self) -> ManifestKind {
        ManifestKind::Artifact
    }

    fn media_types(&self) -> &'static [&'static str] {
        &[ARTIFACT_MANIFEST]
    }

    fn can_unmarshal(&self, content: &[u8]) -> bool {
        serde_json::from_slice::<serde::de::IgnoredAny>(content).is_ok()
    }

    async fn unmarshal(
        &self,
        _ctx: &RequestContext,
        digest: &Digest,
        content: Bytes,
    ) -> RegistryResult<Manifest> {
        tracing::debug!(%digest, "unmarshal artifact manifest");
        if !self.can_unmarshal(&content) {
            return Err(RegistryError::ManifestFormatUnsupported);
        }
        ArtifactManifest::from_bytes(content).map(Manifest::Artifact)
    }

    #[tracing::instrument(skip_all, fields(repository = self.repository.name()))]
    async fn put(
        &self,
        ctx: &RequestContext,
        manifest: &Manifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        let Manifest::Artifact(artifact) = manifest else {
            return Err(RegistryError::ManifestFormatUnsupported);
        };
        tracing::debug!(artifact_type = artifact.artifact_type(), "put artifact manifest");

        self.verify(ctx, artifact, skip_dependency_verification)
            .await?;

        let revision = self
            .repository
            .manifest_blobs()
            .put(ctx, artifact.media_type(), artifact.payload().clone())
            .await
            .inspect_err(|err| tracing::error!(%err, "error storing artifact manifest"))?;

        self.repository
            .referrers_index()
            .index(
                ctx,
                self.repository.name(),
                &artifact.subject().digest,
                &revision,
            )
            .await
            .inspect_err(|err| tracing::error!(%err, "error indexing referrers"))?;

        Ok(revision.digest)
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use futures::TryStreamExt;

    use super::*;
    use crate::manifests::OCI_IMAGE_MANIFEST;
    use crate::testing::{self, artifact_manifest};

    #[test]
    fn test_parse() {
        let subject = Digest::from_bytes(b"subject");
        let blob = Digest::from_bytes(b"blob");
        let manifest =
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[&blob])).unwrap();
        assert_eq!(manifest.artifact_type(), "sig");
        assert_eq!(manifest.subject().digest, subject);
        assert_eq!(manifest.blobs().len(), 1);
        assert_eq!(manifest.blobs()[0].digest, blob);
        assert_eq!(manifest.annotations().get("purpose").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_empty_artifact_type_is_missing_field() {
        let subject = Digest::from_bytes(b"subject");
        let absent = Bytes::from(
            serde_json::json!({
                "mediaType": ARTIFACT_MANIFEST,
                "subject": { "mediaType": "x", "digest": subject, "size": 1 },
            })
            .to_string(),
        );
        for payload in [artifact_manifest("", &subject, &[]), absent] {
            assert!(matches!(
                ArtifactManifest::from_bytes(payload),
                Err(RegistryError::MissingField("artifactType"))
            ));
        }
    }

    #[test]
    fn test_missing_subject_and_foreign_documents() {
        let payload = Bytes::from_static(br#"{"artifactType":"sig","blobs":[]}"#);
        assert!(matches!(
            ArtifactManifest::from_bytes(payload),
            Err(RegistryError::MissingField("subject"))
        ));

        let index = br#"{"mediaType":"application/vnd.oci.image.index.v1+json"}"#;
        for payload in [&b"not json"[..], b"[1,2]", index] {
            assert!(matches!(
                ArtifactManifest::from_bytes(Bytes::copy_from_slice(payload)),
                Err(RegistryError::ManifestFormatUnsupported)
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_subject_fails_before_any_write() {
        let (storage, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let handler = ArtifactManifestHandler::new(repo.clone());
        let subject = Digest::from_bytes(b"never pushed");
        let manifest = Manifest::Artifact(
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[])).unwrap(),
        );

        let err = handler.put(&ctx, &manifest, false).await.unwrap_err();
        assert_eq!(
            err.verification_errors(),
            &[VerificationError::BlobUnknown {
                digest: subject.clone()
            }]
        );
        assert!(matches!(
            repo.blob_store().stat(&ctx, &manifest.digest()).await,
            Err(RegistryError::BlobUnknown(_))
        ));
        assert!(storage.walk(Utf8Path::new("docker")).await.is_err());
    }

    #[tokio::test]
    async fn test_skip_verification_stores_and_indexes() {
        let (_, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let handler = ArtifactManifestHandler::new(repo.clone());
        let subject = Digest::from_bytes(b"never pushed");
        let manifest = Manifest::Artifact(
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[])).unwrap(),
        );

        let digest = handler.put(&ctx, &manifest, true).await.unwrap();
        assert_eq!(digest, manifest.digest());
        assert!(repo.manifests().exists(&ctx, &digest).await.unwrap());

        let indexed: Vec<Digest> = repo
            .referrers_index()
            .enumerate_referrers(&ctx, "app", &subject)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(indexed, vec![digest]);
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let (_, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let handler = ArtifactManifestHandler::new(repo);
        let subject = Digest::from_bytes(b"subject");
        let first = Digest::from_bytes(b"first");
        let second = Digest::from_bytes(b"second");
        let manifest = Manifest::Artifact(
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[&first, &second]))
                .unwrap(),
        );

        let err = handler.put(&ctx, &manifest, false).await.unwrap_err();
        assert_eq!(
            err.verification_errors(),
            &[
                VerificationError::BlobUnknown { digest: first },
                VerificationError::BlobUnknown { digest: second },
                VerificationError::BlobUnknown { digest: subject },
            ]
        );
    }

    #[tokio::test]
    async fn test_blob_stat_failure_reads_as_unknown_blob() {
        let (_, registry) = testing::faulty_registry("docker/registry/v2/blobs");
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();

        let blob = repo
            .blobs()
            .put(&ctx, "application/octet-stream", Bytes::from_static(b"layer"))
            .await
            .unwrap()
            .digest;
        let subject = Digest::from_bytes(b"subject");
        let manifest = Manifest::Artifact(
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[&blob])).unwrap(),
        );

        let err = ArtifactManifestHandler::new(repo)
            .put(&ctx, &manifest, false)
            .await
            .unwrap_err();
        assert!(
            err.verification_errors()
                .contains(&VerificationError::BlobUnknown { digest: blob })
        );
    }

    #[tokio::test]
    async fn test_subject_stat_failure_reads_as_unknown_subject() {
        let (_, registry) = testing::faulty_registry("docker/registry/v2/blobs");
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();

        let subject = repo
            .manifest_blobs()
            .put(&ctx, OCI_IMAGE_MANIFEST, Bytes::from_static(b"{\"schemaVersion\":2}"))
            .await
            .unwrap()
            .digest;
        let manifest = Manifest::Artifact(
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[])).unwrap(),
        );

        let err = ArtifactManifestHandler::new(repo)
            .put(&ctx, &manifest, false)
            .await
            .unwrap_err();
        assert_eq!(
            err.verification_errors(),
            &[VerificationError::BlobUnknown { digest: subject }]
        );
        assert!(!err.to_string().contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_existing_dependencies_pass() {
        let (_, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let subject = testing::push_image(&repo, &ctx, b"image").await;
        let blob = repo
            .blobs()
            .put(&ctx, "application/octet-stream", Bytes::from_static(b"signature"))
            .await
            .unwrap()
            .digest;
        let manifest = Manifest::Artifact(
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[&blob])).unwrap(),
        );

        let digest = ArtifactManifestHandler::new(repo.clone())
            .put(&ctx, &manifest, false)
            .await
            .unwrap();
        assert_eq!(digest, manifest.digest());
    }

    #[tokio::test]
    async fn test_cancelled_put_writes_nothing() {
        let (storage, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        ctx.cancel();
        let subject = Digest::from_bytes(b"subject");
        let manifest = Manifest::Artifact(
            ArtifactManifest::from_bytes(artifact_manifest("sig", &subject, &[])).unwrap(),
        );

        let result = ArtifactManifestHandler::new(repo).put(&ctx, &manifest, true).await;
        assert!(matches!(result, Err(RegistryError::Cancelled)));
        assert!(storage.walk(Utf8Path::new("docker")).await.is_err());
    }
}
