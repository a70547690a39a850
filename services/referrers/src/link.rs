//! Link store
//!
//! A link is a small object whose content is a digest string. Links index
//! content by path without copying it: any number of links may point at the
//! same blob, and each link lives at a key derived from its target's digest.

use std::collections::BTreeSet;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use storage::Storage;

use crate::context::RequestContext;
use crate::descriptor::Descriptor;
use crate::digest::{Algorithm, Digest};
use crate::error::{RegistryError, RegistryResult};
use crate::paths::LINK_FILE;

/// Digest-sharded pointer index layered over a storage driver
#[derive(Debug, Clone)]
pub struct LinkStore {
    storage: Storage,
}

impl LinkStore {
    /// Create a link store over `storage`
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Where the link for `digest` lives under `root`: `{root}/{alg}/{hex}/link`
    pub fn resolve_path(root: &Utf8Path, digest: &Digest) -> Utf8PathBuf {
        root.join(digest.algorithm().as_str())
            .join(digest.hex())
            .join(LINK_FILE)
    }

    /// Record that `descriptor.digest` is reachable under `root`.
    ///
    /// Linking a digest that is already linked leaves the single existing link.
    #[tracing::instrument(skip(self, ctx, descriptor), fields(digest = %descriptor.digest))]
    pub async fn link_blob(
        &self,
        ctx: &RequestContext,
        root: &Utf8Path,
        descriptor: &Descriptor,
    ) -> RegistryResult<()> {
        let path = Self::resolve_path(root, &descriptor.digest);
        let target = descriptor.digest.to_string();

        match ctx.guard(self.storage.get_content(&path)).await {
            Ok(existing) if existing == target.as_bytes() => {
                tracing::trace!(%path, "link already present");
                return Ok(());
            }
            Ok(_) => {}
            Err(RegistryError::Storage(err)) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        ctx.guard(self.storage.put_content(&path, Bytes::from(target)))
            .await
    }

    /// Read the digest that the link for `digest` under `root` points at.
    ///
    /// A missing link surfaces as a not-found storage error.
    pub async fn read_link(
        &self,
        ctx: &RequestContext,
        root: &Utf8Path,
        digest: &Digest,
    ) -> RegistryResult<Digest> {
        let path = Self::resolve_path(root, digest);
        let content = ctx.guard(self.storage.get_content(&path)).await?;
        std::str::from_utf8(&content)
            .ok()
            .and_then(|s| Digest::parse(s.trim()).ok())
            .ok_or(RegistryError::CorruptLink(path))
    }

    /// Lazily enumerate the distinct digests linked under `root`.
    ///
    /// Storage is not touched until the stream is first polled, and the
    /// stream cannot be restarted. Digests come out in lexicographic order.
    /// Keys under `root` that do not have the `{alg}/{hex}/link` shape are
    /// ignored. If nothing exists under `root`, the stream yields a single
    /// not-found [`RegistryError::Storage`] error, which callers treat as
    /// "no entries".
    pub fn enumerate<'a>(
        &'a self,
        ctx: &'a RequestContext,
        root: Utf8PathBuf,
    ) -> BoxStream<'a, RegistryResult<Digest>> {
        stream::once(async move {
            let keys = ctx.guard(self.storage.walk(&root)).await?;
            let digests = linked_digests(&root, &keys);
            tracing::trace!(%root, count = digests.len(), "enumerated links");
            Ok::<_, RegistryError>(stream::iter(
                digests.into_iter().map(Ok::<Digest, RegistryError>),
            ))
        })
        .try_flatten()
        .boxed()
    }
}

fn linked_digests(root: &Utf8Path, keys: &[Utf8PathBuf]) -> BTreeSet<Digest> {
    keys.iter()
        .filter_map(|key| key.strip_prefix(root).ok())
        .filter_map(|relative| {
            let mut parts = relative.components().map(|c| c.as_str());
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(algorithm), Some(hex), Some(LINK_FILE), None) => {
                    let algorithm: Algorithm = algorithm.parse().ok()?;
                    Digest::from_parts(algorithm, hex).ok()
                }
                _ => None,
            }
        })
        .collect()
}
