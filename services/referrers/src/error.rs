//! Error types for the registry

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use camino::Utf8PathBuf;

use crate::digest::{Digest, DigestError};

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A single reason a manifest failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The manifest content violates registry policy
    #[error("manifest invalid: {reason}")]
    ManifestInvalid {
        /// What is wrong with the manifest
        reason: String,
    },

    /// A referenced blob or subject could not be confirmed to exist
    #[error("blob unknown to registry: {digest}")]
    BlobUnknown {
        /// The unresolved digest
        digest: Digest,
    },
}

impl VerificationError {
    fn error_code(&self) -> &'static str {
        match self {
            VerificationError::ManifestInvalid { .. } => "MANIFEST_INVALID",
            VerificationError::BlobUnknown { .. } => "MANIFEST_BLOB_UNKNOWN",
        }
    }

    fn detail(&self) -> Option<serde_json::Value> {
        match self {
            VerificationError::ManifestInvalid { .. } => None,
            VerificationError::BlobUnknown { digest } => {
                Some(serde_json::json!({ "digest": digest }))
            }
        }
    }
}

fn join_all(errors: &[VerificationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No registered manifest handler accepts the content
    #[error("manifest format not supported")]
    ManifestFormatUnsupported,

    /// One or more verification failures, reported together
    #[error("manifest verification failed: {}", join_all(.0))]
    ManifestInvalid(Vec<VerificationError>),

    /// A required manifest field is absent or empty
    #[error("manifest is missing required field `{0}`")]
    MissingField(&'static str),

    /// Manifest not found
    #[error("manifest unknown: {0}")]
    ManifestUnknown(Digest),

    /// Blob not found
    #[error("blob unknown to registry: {0}")]
    BlobUnknown(Digest),

    /// A referrers query named no subject
    #[error("digest not specified")]
    DigestRequired,

    /// Invalid digest format
    #[error("invalid digest: {0}")]
    InvalidDigest(#[from] DigestError),

    /// Content does not hash to the digest it was uploaded under
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Expected digest
        expected: Digest,
        /// Actual digest
        actual: Digest,
    },

    /// Invalid repository name
    #[error("invalid repository name: {0}")]
    InvalidRepository(String),

    /// Blob upload invalid
    #[error("blob upload invalid: {0}")]
    BlobUploadInvalid(String),

    /// A link object does not contain a digest
    #[error("corrupt link at {0}")]
    CorruptLink(Utf8PathBuf),

    /// The request context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// An extension could not be configured
    #[error("extension error: {0}")]
    Extension(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

impl RegistryError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::BlobUnknown(_)
            | RegistryError::ManifestUnknown(_)
            | RegistryError::DigestRequired => StatusCode::NOT_FOUND,
            RegistryError::ManifestInvalid(_)
            | RegistryError::MissingField(_)
            | RegistryError::InvalidDigest(_)
            | RegistryError::InvalidRepository(_)
            | RegistryError::DigestMismatch { .. }
            | RegistryError::BlobUploadInvalid(_) => StatusCode::BAD_REQUEST,
            RegistryError::ManifestFormatUnsupported => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RegistryError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::CorruptLink(_)
            | RegistryError::Extension(_)
            | RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::BlobUnknown(_) => "BLOB_UNKNOWN",
            RegistryError::ManifestUnknown(_) | RegistryError::DigestRequired => {
                "MANIFEST_UNKNOWN"
            }
            RegistryError::InvalidDigest(_) | RegistryError::DigestMismatch { .. } => {
                "DIGEST_INVALID"
            }
            RegistryError::ManifestFormatUnsupported
            | RegistryError::ManifestInvalid(_)
            | RegistryError::MissingField(_) => "MANIFEST_INVALID",
            RegistryError::InvalidRepository(_) => "NAME_INVALID",
            RegistryError::BlobUploadInvalid(_) => "BLOB_UPLOAD_INVALID",
            RegistryError::Cancelled => "UNAVAILABLE",
            RegistryError::CorruptLink(_)
            | RegistryError::Extension(_)
            | RegistryError::Storage(_) => "UNKNOWN",
        }
    }

    /// The individual verification failures, if this is an aggregate
    pub fn verification_errors(&self) -> &[VerificationError] {
        match self {
            RegistryError::ManifestInvalid(errors) => errors,
            _ => &[],
        }
    }

    fn details(&self) -> Vec<ErrorDetail> {
        match self {
            RegistryError::ManifestInvalid(errors) => errors
                .iter()
                .map(|error| ErrorDetail {
                    code: error.error_code(),
                    message: error.to_string(),
                    detail: error.detail(),
                })
                .collect(),
            RegistryError::DigestRequired => vec![ErrorDetail {
                code: self.error_code(),
                message: "manifest unknown".to_string(),
                detail: Some(serde_json::Value::String(self.to_string())),
            }],
            _ => vec![ErrorDetail {
                code: self.error_code(),
                message: self.to_string(),
                detail: None,
            }],
        }
    }
}

/// OCI error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorResponse {
            errors: self.details(),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_lists_every_failure() {
        let blob = Digest::from_bytes(b"blob");
        let subject = Digest::from_bytes(b"subject");
        let err = RegistryError::ManifestInvalid(vec![
            VerificationError::BlobUnknown {
                digest: blob.clone(),
            },
            VerificationError::BlobUnknown {
                digest: subject.clone(),
            },
        ]);

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let details = err.details();
        assert_eq!(details.len(), 2);
        assert!(details.iter().all(|d| d.code == "MANIFEST_BLOB_UNKNOWN"));
        assert_eq!(
            details[1].detail,
            Some(serde_json::json!({ "digest": subject.to_string() }))
        );
        assert!(err.to_string().contains(&blob.to_string()));
    }

    #[test]
    fn test_digest_required_maps_to_manifest_unknown() {
        let err = RegistryError::DigestRequired;
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let details = err.details();
        assert_eq!(details[0].code, "MANIFEST_UNKNOWN");
        assert_eq!(
            details[0].detail,
            Some(serde_json::Value::String("digest not specified".into()))
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RegistryError::ManifestFormatUnsupported.status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            RegistryError::MissingField("artifactType").error_code(),
            "MANIFEST_INVALID"
        );
        assert_eq!(
            RegistryError::Storage(storage::StorageError::not_found("memory", "x")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
