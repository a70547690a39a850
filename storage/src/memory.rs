use std::collections::BTreeMap;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use storage_driver::{Driver, Metadata, StorageError};

#[derive(Debug)]
struct MemoryObject {
    created: DateTime<Utc>,
    data: Bytes,
}

impl From<Bytes> for MemoryObject {
    fn from(data: Bytes) -> Self {
        Self {
            created: Utc::now(),
            data,
        }
    }
}

impl From<&MemoryObject> for Metadata {
    fn from(value: &MemoryObject) -> Self {
        Self {
            created: value.created,
            size: value.data.len() as u64,
        }
    }
}

/// Storage driver that keeps objects in memory.
///
/// Keys are kept ordered so that [`Driver::walk`] is a range scan.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    objects: RwLock<BTreeMap<Utf8PathBuf, MemoryObject>>,
}

impl MemoryDriver {
    /// Create a new, empty `MemoryDriver`.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_content(&self, path: &Utf8Path) -> Result<Bytes, StorageError> {
        let objects = self.objects.read().await;
        objects
            .get(path)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::not_found(self.name(), path.as_str()))
    }

    async fn put_content(&self, path: &Utf8Path, content: Bytes) -> Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        objects.insert(path.to_owned(), content.into());
        Ok(())
    }

    async fn stat(&self, path: &Utf8Path) -> Result<Metadata, StorageError> {
        let objects = self.objects.read().await;
        objects
            .get(path)
            .map(Metadata::from)
            .ok_or_else(|| StorageError::not_found(self.name(), path.as_str()))
    }

    async fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        tracing::trace!(%root, "walk memory objects");

        let objects = self.objects.read().await;
        let paths: Vec<_> = objects
            .range(root.to_owned()..)
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(root))
            .cloned()
            .collect();

        if paths.is_empty() {
            return Err(StorageError::not_found(self.name(), root.as_str()));
        }
        Ok(paths)
    }

    async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(self.name(), path.as_str()))
    }
}
