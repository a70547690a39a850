//! Manifest kinds, handlers and dispatch
//!
//! Each supported manifest kind has a [`ManifestHandler`] that knows how to
//! parse, verify and store it. Handlers are assembled per repository into a
//! [`ManifestDispatcher`], which [`ManifestStore`] uses to serve the
//! repository's manifests.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::RequestContext;
use crate::digest::Digest;
use crate::error::RegistryResult;

pub mod artifact;
mod dispatch;
pub mod image;
mod store;

pub use artifact::{ArtifactManifest, ArtifactManifestHandler};
pub use dispatch::ManifestDispatcher;
pub use image::{ImageManifest, ImageManifestHandler};
pub use store::ManifestStore;

/// ORAS artifact manifest media type
pub const ARTIFACT_MANIFEST: &str = "application/vnd.cncf.oras.artifact.manifest.v1+json";

/// OCI image manifest media type
pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// Docker image manifest (schema 2) media type
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image index media type
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// The manifest kinds this registry understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    /// An image manifest: config plus layers
    Image,
    /// An artifact manifest that refers to a subject
    Artifact,
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestKind::Image => f.write_str("image"),
            ManifestKind::Artifact => f.write_str("artifact"),
        }
    }
}

/// A parsed manifest, carrying the exact bytes it was parsed from
#[derive(Debug, Clone)]
pub enum Manifest {
    /// An image manifest
    Image(ImageManifest),
    /// An artifact manifest
    Artifact(ArtifactManifest),
}

impl Manifest {
    /// Which kind of manifest this is
    pub fn kind(&self) -> ManifestKind {
        match self {
            Manifest::Image(_) => ManifestKind::Image,
            Manifest::Artifact(_) => ManifestKind::Artifact,
        }
    }

    /// The media type the manifest is stored and served as
    pub fn media_type(&self) -> &str {
        match self {
            Manifest::Image(manifest) => manifest.media_type(),
            Manifest::Artifact(manifest) => manifest.media_type(),
        }
    }

    /// The verbatim bytes the manifest was parsed from
    pub fn payload(&self) -> &Bytes {
        match self {
            Manifest::Image(manifest) => manifest.payload(),
            Manifest::Artifact(manifest) => manifest.payload(),
        }
    }

    /// The manifest's own digest, computed over its payload
    pub fn digest(&self) -> Digest {
        Digest::from_bytes(self.payload())
    }

    /// The artifact manifest, if this is one
    pub fn as_artifact(&self) -> Option<&ArtifactManifest> {
        match self {
            Manifest::Artifact(manifest) => Some(manifest),
            Manifest::Image(_) => None,
        }
    }
}

/// Validate-then-persist pipeline for one manifest kind
#[async_trait]
pub trait ManifestHandler: fmt::Debug + Send + Sync {
    /// The kind of manifest this handler produces and stores
    fn kind(&self) -> ManifestKind;

    /// Media types this handler is the direct target for
    fn media_types(&self) -> &'static [&'static str];

    /// Cheap structural probe used when the media type is not known.
    /// Performs no semantic validation.
    fn can_unmarshal(&self, content: &[u8]) -> bool;

    /// Parse `content`, whose digest is `digest`
    async fn unmarshal(
        &self,
        ctx: &RequestContext,
        digest: &Digest,
        content: Bytes,
    ) -> RegistryResult<Manifest>;

    /// Whether `manifest` was produced by this handler's kind
    fn can_put(&self, manifest: &Manifest) -> bool {
        manifest.kind() == self.kind()
    }

    /// Verify and store `manifest`, returning its digest
    async fn put(
        &self,
        ctx: &RequestContext,
        manifest: &Manifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest>;
}
