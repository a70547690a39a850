//! ORAS artifacts extension
//!
//! Adds artifact manifests to every repository and serves
//! `GET /v2/{name}/_oras/artifacts/referrers?digest=...&artifactType=...`.
//!
//! Options:
//!
//! ```toml
//! [extensions.oras]
//! artifacts = ["referrers"]
//! response-format = "oras"   # or "oci-index"
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::descriptor::ArtifactDescriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::extension::{ExtendedRoute, Extension};
use crate::manifests::{ArtifactManifestHandler, ManifestHandler, OCI_IMAGE_INDEX};
use crate::referrers::ReferrersService;
use crate::repository::{Registry, Repository};

/// Name the extension is registered under
pub const NAME: &str = "oras";

const REFERRERS: &str = "referrers";

/// How referrer listings are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseFormat {
    /// `{"references": [...]}` as `application/json`
    #[default]
    Oras,
    /// An OCI image index whose `manifests` are the referrers
    OciIndex,
}

#[derive(Debug, Serialize)]
struct References {
    references: Vec<ArtifactDescriptor>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferrersIndexDocument {
    schema_version: u32,
    media_type: &'static str,
    manifests: Vec<ArtifactDescriptor>,
    annotations: BTreeMap<String, String>,
}

impl ResponseFormat {
    /// Content-Type of a rendered listing
    pub fn content_type(self) -> &'static str {
        match self {
            ResponseFormat::Oras => "application/json",
            ResponseFormat::OciIndex => OCI_IMAGE_INDEX,
        }
    }

    /// Render a referrer listing
    pub fn render(self, referrers: Vec<ArtifactDescriptor>) -> Response {
        let content_type = [(header::CONTENT_TYPE, self.content_type())];
        match self {
            ResponseFormat::Oras => (
                content_type,
                Json(References {
                    references: referrers,
                }),
            )
                .into_response(),
            ResponseFormat::OciIndex => (
                content_type,
                Json(ReferrersIndexDocument {
                    schema_version: 2,
                    media_type: OCI_IMAGE_INDEX,
                    manifests: referrers,
                    annotations: BTreeMap::new(),
                }),
            )
                .into_response(),
        }
    }
}

/// Options for the ORAS extension
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct OrasOptions {
    /// Enabled artifact components; only `referrers` is known
    pub artifacts: Vec<String>,
    /// Shape of referrer listings
    pub response_format: ResponseFormat,
}

impl OrasOptions {
    /// Options with the referrers component enabled
    pub fn referrers() -> Self {
        Self {
            artifacts: vec![REFERRERS.to_string()],
            response_format: ResponseFormat::default(),
        }
    }
}

/// The ORAS artifacts extension
#[derive(Debug, Clone)]
pub struct OrasExtension {
    options: OrasOptions,
}

impl OrasExtension {
    /// Create the extension
    pub fn new(options: OrasOptions) -> Self {
        for component in &options.artifacts {
            if component != REFERRERS {
                tracing::warn!(component, "ignoring unknown oras artifacts component");
            }
        }
        Self { options }
    }

    /// Build the extension from configuration. `null` means default options.
    pub fn from_options(options: &serde_json::Value) -> RegistryResult<Arc<dyn Extension>> {
        let options = if options.is_null() {
            OrasOptions::default()
        } else {
            OrasOptions::deserialize(options)
                .map_err(|err| RegistryError::Extension(format!("invalid {NAME} options: {err}")))?
        };
        Ok(Arc::new(Self::new(options)))
    }

    /// Whether the referrers component is enabled
    pub fn referrers_enabled(&self) -> bool {
        self.options.artifacts.iter().any(|c| c == REFERRERS)
    }
}

impl Extension for OrasExtension {
    fn name(&self) -> &str {
        NAME
    }

    fn manifest_handlers(&self, repository: &Repository) -> Vec<Arc<dyn ManifestHandler>> {
        if self.referrers_enabled() {
            vec![Arc::new(ArtifactManifestHandler::new(repository.clone()))]
        } else {
            Vec::new()
        }
    }

    fn repository_routes(&self) -> Vec<ExtendedRoute> {
        if !self.referrers_enabled() {
            return Vec::new();
        }

        let format = self.options.response_format;
        vec![ExtendedRoute {
            namespace: NAME.into(),
            extension: "artifacts".into(),
            component: REFERRERS.into(),
            handler: get(
                move |state: State<Registry>,
                      path: Path<String>,
                      ctx: RequestContext,
                      query: Query<ReferrersQuery>| {
                    get_referrers(format, state, path, ctx, query)
                },
            ),
        }]
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferrersQuery {
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    artifact_type: Option<String>,
}

async fn get_referrers(
    format: ResponseFormat,
    State(registry): State<Registry>,
    Path(name): Path<String>,
    ctx: RequestContext,
    Query(query): Query<ReferrersQuery>,
) -> RegistryResult<Response> {
    let subject = match query.digest.as_deref() {
        None | Some("") => {
            tracing::debug!("referrers requested without a digest");
            None
        }
        Some(digest) => Some(Digest::parse(digest)?),
    };
    let repository = registry.repository(&name)?;

    let referrers = ReferrersService::new(repository)
        .referrers(&ctx, subject.as_ref(), query.artifact_type.as_deref())
        .await?;
    Ok(format.render(referrers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options() {
        let extension = OrasExtension::from_options(&serde_json::json!({
            "artifacts": ["referrers"],
            "response-format": "oci-index",
        }))
        .unwrap();
        assert_eq!(extension.name(), NAME);
        let routes = extension.repository_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path(), "/v2/{name}/_oras/artifacts/referrers");

        let disabled = OrasExtension::from_options(&serde_json::Value::Null).unwrap();
        assert!(disabled.repository_routes().is_empty());

        assert!(matches!(
            OrasExtension::from_options(&serde_json::json!({ "response-format": "xml" })),
            Err(RegistryError::Extension(_))
        ));
    }

    #[tokio::test]
    async fn test_render_shapes() {
        let referrer = ArtifactDescriptor {
            media_type: crate::manifests::ARTIFACT_MANIFEST.into(),
            digest: Digest::from_bytes(b"sig"),
            size: 3,
            artifact_type: "sig".into(),
        };

        let response = ResponseFormat::Oras.render(vec![referrer.clone()]);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["references"][0]["artifactType"], "sig");

        let response = ResponseFormat::OciIndex.render(vec![referrer]);
        assert_eq!(response.headers()[header::CONTENT_TYPE], OCI_IMAGE_INDEX);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], OCI_IMAGE_INDEX);
        assert_eq!(json["manifests"][0]["size"], 3);
        assert_eq!(json["annotations"], serde_json::json!({}));
    }
}
