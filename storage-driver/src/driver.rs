use std::{fmt, ops::Deref, sync::Arc};

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};

use crate::error::StorageError;

/// Object metadata, which will be generically provided by the driver.
///
/// This struct only provides common metadata fields, and drivers may provide more specific
/// metadata fields directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metadata {
    /// The size of the object in bytes.
    pub size: u64,

    /// The creation timestamp of the object.
    pub created: DateTime<Utc>,
}

/// A storage driver, which provides path-keyed access to a storage backend.
///
/// Paths are relative, `/`-separated keys. Drivers treat them as a hierarchy:
/// every key has parents, and [`Driver::walk`] lists everything below a
/// parent. Directories are never written explicitly.
#[async_trait::async_trait]
pub trait Driver: fmt::Debug {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Read the full contents of an object.
    ///
    /// Fails with [`StorageErrorKind::NotFound`](crate::StorageErrorKind::NotFound)
    /// if nothing is stored at `path`.
    async fn get_content(&self, path: &Utf8Path) -> Result<Bytes, StorageError>;

    /// Write the full contents of an object, replacing anything at `path`.
    ///
    /// A single write must be atomic: readers observe either the old contents
    /// or the new contents. Writes to sibling keys under a shared parent must
    /// not interfere with each other.
    async fn put_content(&self, path: &Utf8Path, content: Bytes) -> Result<(), StorageError>;

    /// Get the metadata for an object, by path.
    async fn stat(&self, path: &Utf8Path) -> Result<Metadata, StorageError>;

    /// List every object key at or below `root`, sorted lexicographically.
    ///
    /// Fails with [`StorageErrorKind::NotFound`](crate::StorageErrorKind::NotFound)
    /// when nothing exists below `root`.
    async fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError>;

    /// Delete an object, by path.
    async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError>;
}

#[async_trait::async_trait]
impl<D> Driver for Arc<D>
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn get_content(&self, path: &Utf8Path) -> Result<Bytes, StorageError> {
        self.deref().get_content(path).await
    }

    async fn put_content(&self, path: &Utf8Path, content: Bytes) -> Result<(), StorageError> {
        self.deref().put_content(path, content).await
    }

    async fn stat(&self, path: &Utf8Path) -> Result<Metadata, StorageError> {
        self.deref().stat(path).await
    }

    async fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        self.deref().walk(root).await
    }

    async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError> {
        self.deref().delete(path).await
    }
}

#[async_trait::async_trait]
impl<D> Driver for &D
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn get_content(&self, path: &Utf8Path) -> Result<Bytes, StorageError> {
        (**self).get_content(path).await
    }

    async fn put_content(&self, path: &Utf8Path, content: Bytes) -> Result<(), StorageError> {
        (**self).put_content(path, content).await
    }

    async fn stat(&self, path: &Utf8Path) -> Result<Metadata, StorageError> {
        (**self).stat(path).await
    }

    async fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        (**self).walk(root).await
    }

    async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError> {
        (**self).delete(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_obj_safe!(Driver);
}
