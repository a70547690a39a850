//! Manifest operations for the registry
//!
//! Manifests are addressed by their sha256 digest only.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;

use crate::blob::DOCKER_CONTENT_DIGEST;
use crate::context::RequestContext;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::repository::Registry;

/// Router for manifest operations
pub(crate) fn router() -> Router<Registry> {
    Router::new().route(
        "/v2/{name}/manifests/{reference}",
        get(get_manifest).head(head_manifest).put(put_manifest),
    )
}

async fn get_manifest(
    State(registry): State<Registry>,
    Path((name, reference)): Path<(String, String)>,
    ctx: RequestContext,
) -> RegistryResult<Response> {
    let repository = registry.repository(&name)?;
    let digest = Digest::parse(&reference)?;

    let manifest = repository.manifests().get(&ctx, &digest).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, manifest.media_type().to_string()),
            (DOCKER_CONTENT_DIGEST, digest.to_string()),
        ],
        manifest.payload().clone(),
    )
        .into_response())
}

async fn head_manifest(
    State(registry): State<Registry>,
    Path((name, reference)): Path<(String, String)>,
    ctx: RequestContext,
) -> RegistryResult<Response> {
    let repository = registry.repository(&name)?;
    let digest = Digest::parse(&reference)?;

    let manifest = repository.manifests().get(&ctx, &digest).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, manifest.media_type().to_string()),
            (DOCKER_CONTENT_DIGEST, digest.to_string()),
            (header::CONTENT_LENGTH, manifest.payload().len().to_string()),
        ],
    )
        .into_response())
}

/// Put a manifest.
///
/// The `Content-Type` header selects the handler when it names a known
/// manifest type. Dependencies are always verified.
async fn put_manifest(
    State(registry): State<Registry>,
    Path((name, reference)): Path<(String, String)>,
    ctx: RequestContext,
    headers: HeaderMap,
    body: Bytes,
) -> RegistryResult<Response> {
    let repository = registry.repository(&name)?;
    let expected = Digest::parse(&reference)?;
    let actual = Digest::from_bytes(&body);
    if actual != expected {
        return Err(RegistryError::DigestMismatch { expected, actual });
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim());
    let manifests = repository.manifests();
    let manifest = manifests
        .unmarshal(&ctx, &expected, body, content_type)
        .await?;
    let digest = manifests.put(&ctx, &manifest, false).await?;
    tracing::debug!(repository = %name, %digest, kind = %manifest.kind(), "manifest stored");

    let location = format!("/v2/{name}/manifests/{digest}");
    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION, location),
            (DOCKER_CONTENT_DIGEST, digest.to_string()),
        ],
    )
        .into_response())
}
