//! Blob operations for the registry

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use bytes::Bytes;
use serde::Deserialize;

use crate::context::RequestContext;
use crate::descriptor::OCTET_STREAM;
use crate::digest::{Algorithm, Digest};
use crate::error::{RegistryError, RegistryResult};
use crate::repository::Registry;

pub(crate) const DOCKER_CONTENT_DIGEST: header::HeaderName =
    header::HeaderName::from_static("docker-content-digest");

/// Router for blob operations
pub(crate) fn router() -> Router<Registry> {
    Router::new()
        .route("/v2/{name}/blobs/{digest}", get(get_blob).head(head_blob))
        .route("/v2/{name}/blobs/uploads/", post(start_blob_upload))
        .route(
            "/v2/{name}/blobs/uploads/{uuid}",
            put(complete_blob_upload).delete(cancel_blob_upload),
        )
}

async fn get_blob(
    State(registry): State<Registry>,
    Path((name, digest)): Path<(String, String)>,
    ctx: RequestContext,
) -> RegistryResult<Response> {
    let repository = registry.repository(&name)?;
    let digest = Digest::parse(&digest)?;

    let data = repository.blobs().get(&ctx, &digest).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, OCTET_STREAM.to_string()),
            (DOCKER_CONTENT_DIGEST, digest.to_string()),
        ],
        data,
    )
        .into_response())
}

async fn head_blob(
    State(registry): State<Registry>,
    Path((name, digest)): Path<(String, String)>,
    ctx: RequestContext,
) -> RegistryResult<Response> {
    let repository = registry.repository(&name)?;
    let digest = Digest::parse(&digest)?;

    let descriptor = repository.blobs().stat(&ctx, &digest).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, OCTET_STREAM.to_string()),
            (header::CONTENT_LENGTH, descriptor.size.to_string()),
            (DOCKER_CONTENT_DIGEST, digest.to_string()),
        ],
    )
        .into_response())
}

/// Start a blob upload session
async fn start_blob_upload(
    State(registry): State<Registry>,
    Path(name): Path<String>,
) -> RegistryResult<Response> {
    registry.repository(&name)?;

    let uuid = uuid::Uuid::new_v4();
    let location = format!("/v2/{name}/blobs/uploads/{uuid}");
    tracing::debug!(repository = %name, %uuid, "blob upload started");

    Ok((
        StatusCode::ACCEPTED,
        [
            (header::LOCATION, location),
            (header::RANGE, "0-0".to_string()),
            (header::HeaderName::from_static("docker-upload-uuid"), uuid.to_string()),
        ],
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    #[serde(default)]
    digest: Option<String>,
}

/// Complete a monolithic blob upload
async fn complete_blob_upload(
    State(registry): State<Registry>,
    Path((name, _uuid)): Path<(String, String)>,
    ctx: RequestContext,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> RegistryResult<Response> {
    let repository = registry.repository(&name)?;

    let digest = query
        .digest
        .as_deref()
        .or_else(|| headers.get("digest").and_then(|v| v.to_str().ok()))
        .ok_or_else(|| RegistryError::BlobUploadInvalid("missing digest".to_string()))?;
    let expected = Digest::parse(digest)?;
    if expected.algorithm() != Algorithm::Sha256 {
        return Err(RegistryError::BlobUploadInvalid(format!(
            "blobs must be uploaded with {} digests",
            Algorithm::Sha256
        )));
    }

    let actual = Digest::from_bytes(&body);
    if actual != expected {
        return Err(RegistryError::DigestMismatch { expected, actual });
    }
    let descriptor = repository.blobs().put(&ctx, OCTET_STREAM, body).await?;
    let location = format!("/v2/{name}/blobs/{}", descriptor.digest);

    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION, location),
            (header::CONTENT_LENGTH, "0".to_string()),
            (DOCKER_CONTENT_DIGEST, descriptor.digest.to_string()),
        ],
    )
        .into_response())
}

/// Cancel a blob upload
async fn cancel_blob_upload(
    State(registry): State<Registry>,
    Path((name, _uuid)): Path<(String, String)>,
) -> RegistryResult<StatusCode> {
    registry.repository(&name)?;
    Ok(StatusCode::NO_CONTENT)
}
