//! Referrers index
//!
//! Records "artifact X refers to subject S" as a link under a per-subject
//! root, so that every referrer of a subject can be listed without scanning
//! manifests.

use camino::Utf8PathBuf;
use futures::stream::BoxStream;

use crate::context::RequestContext;
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::RegistryResult;
use crate::link::LinkStore;
use crate::paths;

/// Subject-to-referrer links for every repository in a store
#[derive(Debug, Clone)]
pub struct ReferrersIndex {
    links: LinkStore,
}

impl ReferrersIndex {
    /// Create an index over a link store
    pub fn new(links: LinkStore) -> Self {
        Self { links }
    }

    /// Link root holding the referrers of `subject` in `repository`
    pub fn root_for(repository: &str, subject: &Digest) -> Utf8PathBuf {
        paths::referrer_subjects(repository)
            .join(subject.algorithm().as_str())
            .join(subject.hex())
    }

    /// Record that `referrer` refers to `subject`. Idempotent.
    pub async fn index(
        &self,
        ctx: &RequestContext,
        repository: &str,
        subject: &Digest,
        referrer: &Descriptor,
    ) -> RegistryResult<()> {
        let root = Self::root_for(repository, subject);
        tracing::debug!(%subject, referrer = %referrer.digest, "indexing referrer");
        self.links.link_blob(ctx, &root, referrer).await
    }

    /// Lazily list the digests of every manifest indexed against `subject`.
    ///
    /// A subject with no referrers yields a not-found storage error.
    pub fn enumerate_referrers<'a>(
        &'a self,
        ctx: &'a RequestContext,
        repository: &str,
        subject: &Digest,
    ) -> BoxStream<'a, RegistryResult<Digest>> {
        self.links.enumerate(ctx, Self::root_for(repository, subject))
    }
}
