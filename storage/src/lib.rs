//! # Storage backends
//!
//! Configuration and unification for the registry storage backends.

use std::sync::Arc;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

#[cfg(feature = "local")]
pub(crate) mod local;

pub(crate) mod memory;
#[cfg(feature = "tmp")]
pub(crate) mod temp;

#[cfg(feature = "local")]
#[doc(inline)]
pub use local::LocalDriver;

#[doc(inline)]
pub use memory::MemoryDriver;

#[cfg(feature = "tmp")]
#[doc(inline)]
pub use temp::TempDriver;

#[doc(inline)]
pub use storage_driver::{Driver, Metadata, StorageError, StorageErrorKind};

/// Which backend to store registry content in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "driver", rename_all = "kebab-case")]
pub enum StorageConfig {
    /// Keep everything in process memory.
    #[default]
    Memory,

    /// Store objects as files below `path`.
    #[cfg(feature = "local")]
    Local {
        /// Root directory for all objects.
        path: Utf8PathBuf,
    },

    /// Store objects in a temporary directory removed on shutdown.
    #[cfg(feature = "tmp")]
    Temp,
}

impl StorageConfig {
    /// Construct the configured storage backend.
    #[tracing::instrument]
    pub fn build(self) -> Result<Storage, StorageError> {
        let client: Storage = match self {
            StorageConfig::Memory => MemoryDriver::new().into(),
            #[cfg(feature = "local")]
            StorageConfig::Local { path } => LocalDriver::new(path).into(),
            #[cfg(feature = "tmp")]
            StorageConfig::Temp => TempDriver::new()
                .map_err(StorageError::with("temp", StorageErrorKind::Io))?
                .into(),
        };
        tracing::debug!(driver = client.name(), "storage configured");
        Ok(client)
    }
}

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// A cheaply clonable handle to a storage driver.
#[derive(Debug, Clone)]
pub struct Storage {
    driver: ArcDriver,
}

impl<D> From<D> for Storage
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Storage::new(value)
    }
}

impl Storage {
    /// Wrap a driver in a shared handle.
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// The name of the underlying driver.
    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    /// Read the full contents of an object.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn get_content(&self, path: &Utf8Path) -> Result<Bytes, StorageError> {
        self.driver.get_content(path).await
    }

    /// Write the full contents of an object.
    #[tracing::instrument(skip(self, content), fields(driver=self.driver.name(), size=content.len()))]
    pub async fn put_content(&self, path: &Utf8Path, content: Bytes) -> Result<(), StorageError> {
        tracing::trace!(%path, "writing object");
        self.driver.put_content(path, content).await
    }

    /// Get the metadata for an object.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn stat(&self, path: &Utf8Path) -> Result<Metadata, StorageError> {
        self.driver.stat(path).await
    }

    /// List every object key at or below `root`.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        self.driver.walk(root).await
    }

    /// Delete an object.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError> {
        self.driver.delete(path).await
    }
}
