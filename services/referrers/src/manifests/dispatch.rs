use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;

use super::{Manifest, ManifestHandler};
use crate::context::RequestContext;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaTypeProbe {
    #[serde(default)]
    media_type: Option<String>,
}

/// Selects the handler for a manifest among a repository's handlers.
///
/// A known media type picks its handler directly. Otherwise handlers are
/// probed in registration order and the first that accepts wins, so
/// fallback handlers must be registered after more specific ones.
#[derive(Debug, Clone)]
pub struct ManifestDispatcher {
    handlers: Vec<Arc<dyn ManifestHandler>>,
}

impl ManifestDispatcher {
    /// Dispatch over `handlers`, in order
    pub fn new(handlers: Vec<Arc<dyn ManifestHandler>>) -> Self {
        Self { handlers }
    }

    /// The handlers, in dispatch order
    pub fn handlers(&self) -> &[Arc<dyn ManifestHandler>] {
        &self.handlers
    }

    fn by_media_type(&self, media_type: &str) -> Option<&Arc<dyn ManifestHandler>> {
        self.handlers
            .iter()
            .find(|handler| handler.media_types().contains(&media_type))
    }

    /// Parse `content` with the handler that owns it.
    ///
    /// `media_type` is the type the client declared, if any. Without one,
    /// a `mediaType` field in the document is used the same way.
    pub async fn unmarshal(
        &self,
        ctx: &RequestContext,
        digest: &Digest,
        content: Bytes,
        media_type: Option<&str>,
    ) -> RegistryResult<Manifest> {
        let declared = match media_type {
            Some(media_type) => Some(media_type.to_string()),
            None => serde_json::from_slice::<MediaTypeProbe>(&content)
                .ok()
                .and_then(|probe| probe.media_type),
        };

        if let Some(handler) = declared
            .as_deref()
            .and_then(|media_type| self.by_media_type(media_type))
        {
            tracing::trace!(kind = %handler.kind(), "dispatch by media type");
            return handler.unmarshal(ctx, digest, content).await;
        }

        match self
            .handlers
            .iter()
            .find(|handler| handler.can_unmarshal(&content))
        {
            Some(handler) => {
                tracing::trace!(kind = %handler.kind(), "dispatch by probe");
                handler.unmarshal(ctx, digest, content).await
            }
            None => Err(RegistryError::ManifestFormatUnsupported),
        }
    }

    /// Store `manifest` with the first handler that accepts it
    pub async fn put(
        &self,
        ctx: &RequestContext,
        manifest: &Manifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        match self.handlers.iter().find(|handler| handler.can_put(manifest)) {
            Some(handler) => {
                handler
                    .put(ctx, manifest, skip_dependency_verification)
                    .await
            }
            None => Err(RegistryError::ManifestFormatUnsupported),
        }
    }
}
