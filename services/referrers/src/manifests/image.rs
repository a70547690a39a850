//! Image manifests (OCI and Docker schema 2)

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use super::{DOCKER_MANIFEST_V2, Manifest, ManifestHandler, ManifestKind, OCI_IMAGE_MANIFEST};
use crate::context::RequestContext;
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult, VerificationError};
use crate::repository::Repository;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageManifestDocument {
    schema_version: u32,
    #[serde(default)]
    media_type: Option<String>,
    config: Descriptor,
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Probe {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    config: Option<serde::de::IgnoredAny>,
    #[serde(default)]
    layers: Option<serde::de::IgnoredAny>,
}

/// A parsed image manifest and the exact bytes it came from
#[derive(Debug, Clone)]
pub struct ImageManifest {
    schema_version: u32,
    media_type: String,
    config: Descriptor,
    layers: Vec<Descriptor>,
    payload: Bytes,
}

impl ImageManifest {
    /// Parse an image manifest
    pub fn from_bytes(payload: Bytes) -> RegistryResult<Self> {
        let document: ImageManifestDocument =
            serde_json::from_slice(&payload).map_err(|err| {
                tracing::debug!(%err, "not an image manifest");
                RegistryError::ManifestFormatUnsupported
            })?;

        let media_type = match document.media_type {
            None => OCI_IMAGE_MANIFEST.to_string(),
            Some(media_type) if is_image_media_type(&media_type) => media_type,
            Some(_) => return Err(RegistryError::ManifestFormatUnsupported),
        };

        Ok(Self {
            schema_version: document.schema_version,
            media_type,
            config: document.config,
            layers: document.layers,
            payload,
        })
    }

    /// The declared schema version
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// The media type the manifest declares, defaulting to the OCI type
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The image configuration blob
    pub fn config(&self) -> &Descriptor {
        &self.config
    }

    /// Layer blobs, base layer first
    pub fn layers(&self) -> &[Descriptor] {
        &self.layers
    }

    /// The verbatim bytes this manifest was parsed from
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

fn is_image_media_type(media_type: &str) -> bool {
    media_type == OCI_IMAGE_MANIFEST || media_type == DOCKER_MANIFEST_V2
}

/// Stores image manifests once their config and layers are present
#[derive(Debug, Clone)]
pub struct ImageManifestHandler {
    repository: Repository,
}

impl ImageManifestHandler {
    /// Handle image manifests for `repository`
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    async fn verify(
        &self,
        ctx: &RequestContext,
        manifest: &ImageManifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<()> {
        let mut errors = Vec::new();

        if manifest.schema_version() != 2 {
            errors.push(VerificationError::ManifestInvalid {
                reason: format!("unsupported schemaVersion {}", manifest.schema_version()),
            });
        }

        if !skip_dependency_verification {
            let blobs = self.repository.blobs();
            let dependencies = std::iter::once(manifest.config()).chain(manifest.layers());
            for dependency in dependencies {
                match blobs.stat(ctx, &dependency.digest).await {
                    Ok(_) => {}
                    Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled),
                    Err(_) => errors.push(VerificationError::BlobUnknown {
                        digest: dependency.digest.clone(),
                    }),
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
impl ManifestHandler for ImageManifestHandler {
    fn kind(&self) -> ManifestKind {
        ManifestKind::Image
    }

    fn media_types(&self) -> &'static [&'static str] {
        &[OCI_IMAGE_MANIFEST, DOCKER_MANIFEST_V2]
    }

    fn can_unmarshal(&self, content: &[u8]) -> bool {
        match serde_json::from_slice::<Probe>(content) {
            Ok(Probe {
                media_type: Some(media_type),
                ..
            }) => is_image_media_type(&media_type),
            Ok(Probe {
                media_type: None,
                schema_version,
                config,
                layers,
            }) => schema_version == Some(2) && config.is_some() && layers.is_some(),
            Err(_) => false,
        }
    }

    async fn unmarshal(
        &self,
        _ctx: &RequestContext,
        digest: &Digest,
        content: Bytes,
    ) -> RegistryResult<Manifest> {
        tracing::debug!(%digest, "unmarshal image manifest");
        ImageManifest::from_bytes(content).map(Manifest::Image)
    }

    #[tracing::instrument(skip_all, fields(repository = self.repository.name()))]
    async fn put(
        &self,
        ctx: &RequestContext,
        manifest: &Manifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        let Manifest::Image(image) = manifest else {
            return Err(RegistryError::ManifestFormatUnsupported);
        };
        tracing::debug!(layers = image.layers().len(), "put image manifest");

        self.verify(ctx, image, skip_dependency_verification).await?;

        let revision = self
            .repository
            .manifest_blobs()
            .put(ctx, image.media_type(), image.payload().clone())
            .await
            .inspect_err(|err| tracing::error!(%err, "error storing image manifest"))?;
        Ok(revision.digest)
    }
}
