//! Content descriptors

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Media type reported for content whose type is not recorded in storage
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Identifies a piece of content without containing it.
///
/// Only the digest is identity: two descriptors are equal when their digests
/// are, whatever they claim about size or media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    pub media_type: String,
    /// Digest of the referenced content
    pub digest: Digest,
    /// Size of the referenced content in bytes
    pub size: i64,
}

impl Descriptor {
    /// Create a new descriptor
    pub fn new(media_type: impl Into<String>, digest: Digest, size: i64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
        }
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

/// A referrer listing entry: a descriptor plus the referrer's artifact type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    /// Media type of the referrer manifest
    pub media_type: String,
    /// Digest of the referrer manifest
    pub digest: Digest,
    /// Size of the referrer manifest in bytes
    pub size: i64,
    /// Artifact type declared by the referrer manifest
    pub artifact_type: String,
}
