//! Referrers query service

use futures::StreamExt;

use crate::context::RequestContext;
use crate::descriptor::ArtifactDescriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::repository::Repository;

/// Answers "which artifacts in this repository refer to digest D"
#[derive(Debug, Clone)]
pub struct ReferrersService {
    repository: Repository,
}

impl ReferrersService {
    /// Query referrers within `repository`
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// List the artifact manifests whose subject is `subject`.
    ///
    /// A subject nothing refers to yields an empty list. Only referrers whose
    /// artifact type equals `artifact_type` are kept, unless it is absent or
    /// empty. Entries come out in index order, which callers must not rely on.
    #[tracing::instrument(skip(self, ctx), fields(repository = self.repository.name()))]
    pub async fn referrers(
        &self,
        ctx: &RequestContext,
        subject: Option<&Digest>,
        artifact_type: Option<&str>,
    ) -> RegistryResult<Vec<ArtifactDescriptor>> {
        let subject = subject.ok_or(RegistryError::DigestRequired)?;

        let manifests = self.repository.manifests();
        let blobs = self.repository.blob_store();
        let index = self.repository.referrers_index();

        let mut referrers = Vec::new();
        let mut entries = index.enumerate_referrers(ctx, self.repository.name(), subject);
        while let Some(entry) = entries.next().await {
            ctx.check()?;
            let digest = match entry {
                Ok(digest) => digest,
                Err(RegistryError::Storage(err)) if err.is_not_found() => {
                    tracing::debug!("no referrers indexed");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            };

            let manifest = manifests.get(ctx, &digest).await?;
            let Some(artifact) = manifest.as_artifact() else {
                tracing::debug!(%digest, kind = %manifest.kind(), "skipping non-artifact referrer");
                continue;
            };

            let descriptor = blobs.stat(ctx, &digest).await?;
            referrers.push(ArtifactDescriptor {
                media_type: manifest.media_type().to_string(),
                digest: descriptor.digest,
                size: descriptor.size,
                artifact_type: artifact.artifact_type().to_string(),
            });
        }

        if let Some(wanted) = artifact_type.filter(|wanted| !wanted.is_empty()) {
            referrers.retain(|referrer| referrer.artifact_type == wanted);
        }

        tracing::debug!(count = referrers.len(), "listed referrers");
        Ok(referrers)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use bytes::Bytes;

    use super::*;
    use crate::index::ReferrersIndex;
    use crate::link::LinkStore;
    use crate::manifests::ARTIFACT_MANIFEST;
    use crate::testing;

    async fn push_artifact(
        repository: &Repository,
        ctx: &RequestContext,
        artifact_type: &str,
        subject: &Digest,
    ) -> Digest {
        let content = testing::artifact_manifest(artifact_type, subject, &[]);
        let manifests = repository.manifests();
        let manifest = manifests
            .unmarshal(ctx, &Digest::from_bytes(&content), content, None)
            .await
            .unwrap();
        manifests.put(ctx, &manifest, false).await.unwrap()
    }

    #[tokio::test]
    async fn test_subject_required() {
        let (_, registry) = testing::registry();
        let service = ReferrersService::new(registry.repository("app").unwrap());
        assert!(matches!(
            service.referrers(&RequestContext::new(), None, None).await,
            Err(RegistryError::DigestRequired)
        ));
    }

    #[tokio::test]
    async fn test_unreferenced_subject_is_empty() {
        let (_, registry) = testing::registry();
        let service = ReferrersService::new(registry.repository("app").unwrap());
        let ctx = RequestContext::new();
        for content in [&b"never seen"[..], b"", b"another"] {
            let listed = service
                .referrers(&ctx, Some(&Digest::from_bytes(content)), None)
                .await
                .unwrap();
            assert!(listed.is_empty());
        }
    }

    #[tokio::test]
    async fn test_filter_by_artifact_type() {
        let (_, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let subject = testing::push_image(&repo, &ctx, b"layer").await;

        let a = push_artifact(&repo, &ctx, "a", &subject).await;
        let b = push_artifact(&repo, &ctx, "b", &subject).await;
        let service = ReferrersService::new(repo);

        let only_a = service.referrers(&ctx, Some(&subject), Some("a")).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].digest, a);
        assert_eq!(only_a[0].artifact_type, "a");
        assert_eq!(only_a[0].media_type, ARTIFACT_MANIFEST);

        let only_b = service.referrers(&ctx, Some(&subject), Some("b")).await.unwrap();
        assert_eq!(only_b.iter().map(|r| &r.digest).collect::<Vec<_>>(), vec![&b]);

        for unfiltered in [None, Some("")] {
            let all: BTreeSet<Digest> = service
                .referrers(&ctx, Some(&subject), unfiltered)
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.digest)
                .collect();
            assert_eq!(all, BTreeSet::from([a.clone(), b.clone()]));
        }
    }

    #[tokio::test]
    async fn test_sizes_come_from_the_blob_store() {
        let (_, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let subject = testing::push_image(&repo, &ctx, b"layer").await;
        let expected = testing::artifact_manifest("sig", &subject, &[]).len() as i64;
        push_artifact(&repo, &ctx, "sig", &subject).await;

        let listed = ReferrersService::new(repo)
            .referrers(&ctx, Some(&subject), None)
            .await
            .unwrap();
        assert_eq!(listed[0].size, expected);
    }

    #[tokio::test]
    async fn test_foreign_index_entries_are_skipped() {
        let (storage, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let subject = testing::push_image(&repo, &ctx, b"layer").await;
        let sig = push_artifact(&repo, &ctx, "sig", &subject).await;

        // an image manifest indexed against the subject by something else
        let image = testing::push_image(&repo, &ctx, b"other layer").await;
        let descriptor = repo.manifest_blobs().stat(&ctx, &image).await.unwrap();
        ReferrersIndex::new(LinkStore::new(storage.clone()))
            .index(&ctx, "app", &subject, &descriptor)
            .await
            .unwrap();
        storage
            .put_content(
                &ReferrersIndex::root_for("app", &subject).join("README"),
                Bytes::from_static(b"not a link"),
            )
            .await
            .unwrap();

        let listed = ReferrersService::new(repo)
            .referrers(&ctx, Some(&subject), None)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].digest, sig);
    }

    #[tokio::test]
    async fn test_referrers_are_scoped_to_repository() {
        let (_, registry) = testing::registry();
        let ctx = RequestContext::new();
        let app = registry.repository("app").unwrap();
        let subject = testing::push_image(&app, &ctx, b"layer").await;
        push_artifact(&app, &ctx, "sig", &subject).await;

        let other = ReferrersService::new(registry.repository("other").unwrap());
        assert!(other.referrers(&ctx, Some(&subject), None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_are_all_listed() {
        let (_, registry) = testing::registry();
        let repo = registry.repository("app").unwrap();
        let ctx = RequestContext::new();
        let subject = testing::push_image(&repo, &ctx, b"layer").await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                let subject = subject.clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::new();
                    push_artifact(&repo, &ctx, &format!("type-{i}"), &subject).await
                })
            })
            .collect();

        let mut pushed = BTreeSet::new();
        for task in tasks {
            pushed.insert(task.await.unwrap());
        }
        assert_eq!(pushed.len(), 16);

        let listed: BTreeSet<Digest> = ReferrersService::new(repo)
            .referrers(&ctx, Some(&subject), None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.digest)
            .collect();
        assert_eq!(listed, pushed);
    }

    #[tokio::test]
    async fn test_cancelled_query() {
        let (_, registry) = testing::registry();
        let ctx = RequestContext::new();
        ctx.cancel();
        let service = ReferrersService::new(registry.repository("app").unwrap());
        assert!(matches!(
            service
                .referrers(&ctx, Some(&Digest::from_bytes(b"subject")), None)
                .await,
            Err(RegistryError::Cancelled)
        ));
    }
}
