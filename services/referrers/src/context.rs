//! Per-request context

use std::convert::Infallible;
use std::future::Future;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, RegistryResult};
use crate::repository::Registry;

/// Request-scoped context threaded through every storage-touching operation.
///
/// Cancelling the context aborts in-flight storage calls made through
/// [`RequestContext::guard`], which then fail with [`RegistryError::Cancelled`].
/// Steps of a multi-step operation that have already completed are not undone.
///
/// HTTP handlers extract one per request. It is a child of the registry's
/// shutdown token, so stopping the server cancels every request in flight.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
}

impl RequestContext {
    /// A fresh, uncancelled context
    pub fn new() -> Self {
        Self::default()
    }

    /// A context cancelled together with `token`
    pub fn with_token(token: CancellationToken) -> Self {
        Self { cancel: token }
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the context has been cancelled
    pub fn check(&self) -> RegistryResult<()> {
        if self.is_cancelled() {
            Err(RegistryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `operation` unless and until the context is cancelled.
    ///
    /// An already-cancelled context never polls `operation`.
    pub async fn guard<F, T, E>(&self, operation: F) -> RegistryResult<T>
    where
        F: Future<Output = Result<T, E>>,
        RegistryError: From<E>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RegistryError::Cancelled),
            result = operation => result.map_err(RegistryError::from),
        }
    }
}

impl FromRequestParts<Registry> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        registry: &Registry,
    ) -> Result<Self, Self::Rejection> {
        Ok(registry.request_context())
    }
}
