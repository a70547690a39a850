use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use eyre::WrapErr;
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

use storage_driver::{Driver, Metadata, StorageError, StorageErrorKind};

/// Prefix for in-flight writes, which are never listed by [`Driver::walk`].
const STAGING_PREFIX: &str = ".staging-";

/// Storage driver that keeps objects as files below a root directory.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    /// Create a driver rooted at `root`. The directory is created on first write.
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn path(&self, remote: &Utf8Path) -> Utf8PathBuf {
        self.root.join(remote)
    }
}

fn io_error(
    engine: &'static str,
    path: &Utf8Path,
    context: &'static str,
) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.to_string();
    move |err| {
        StorageError::builder(engine, err.kind().into(), err)
            .path(path)
            .context(context)
            .build()
    }
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_content(&self, remote: &Utf8Path) -> Result<Bytes, StorageError> {
        let path = self.path(remote);
        let data = tokio::fs::read(&path)
            .await
            .map_err(io_error(self.name(), remote, "read file"))?;
        Ok(data.into())
    }

    async fn put_content(&self, remote: &Utf8Path, content: Bytes) -> Result<(), StorageError> {
        let path = self.path(remote);
        let (parent, file_name) = match (path.parent(), path.file_name()) {
            (Some(parent), Some(file_name)) => (parent.to_owned(), file_name.to_owned()),
            _ => {
                return Err(StorageError::builder(
                    self.name(),
                    StorageErrorKind::InvalidRequest,
                    eyre::eyre!("path has no file name: {remote}"),
                )
                .path(remote.as_str())
                .build())
            }
        };

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(io_error(self.name(), remote, "create parent directories"))?;

        // Stage into a uniquely named sibling, then rename over the target.
        let staging = parent.join(format!(
            "{STAGING_PREFIX}{file_name}-{}",
            uuid::Uuid::new_v4().simple()
        ));
        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(io_error(self.name(), remote, "create staging file"))?;
        file.write_all(&content)
            .await
            .map_err(io_error(self.name(), remote, "write staging file"))?;
        file.sync_all()
            .await
            .map_err(io_error(self.name(), remote, "sync staging file"))?;
        drop(file);

        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_error(self.name(), remote, "rename staging file")(err));
        }
        Ok(())
    }

    async fn stat(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let path = self.path(remote);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(io_error(self.name(), remote, "metadata"))?;
        if metadata.is_dir() {
            return Err(StorageError::not_found(self.name(), remote.as_str()));
        }

        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(io_error(self.name(), remote, "file timestamps"))?;
        Ok(Metadata {
            size: metadata.len(),
            created: created.into(),
        })
    }

    async fn walk(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        let base = self.root.clone();
        let target = self.path(root);

        let items = tokio::task::spawn_blocking(move || collect_files(&base, &target))
            .in_current_span()
            .await
            .wrap_err("local driver: walk task")
            .map_err(StorageError::with(self.name(), StorageErrorKind::Other))?
            .map_err(io_error(self.name(), root, "walk directory"))?;

        tracing::debug!(%root, "found {} entries", items.len());
        if items.is_empty() {
            return Err(StorageError::not_found(self.name(), root.as_str()));
        }
        Ok(items)
    }

    async fn delete(&self, remote: &Utf8Path) -> Result<(), StorageError> {
        let path = self.path(remote);
        tokio::fs::remove_file(path)
            .await
            .map_err(io_error(self.name(), remote, "remove file"))
    }
}

#[tracing::instrument(level = "trace")]
fn collect_files(base: &Utf8Path, target: &Utf8Path) -> std::io::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    match std::fs::metadata(target) {
        Ok(meta) if meta.is_file() => files.push(target.to_owned()),
        Ok(_) => visit(target, &mut files)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let mut relative: Vec<_> = files
        .into_iter()
        .filter_map(|p| p.strip_prefix(base).ok().map(|p| p.to_owned()))
        .collect();
    relative.sort();
    Ok(relative)
}

fn visit(path: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> std::io::Result<()> {
    for entry in path.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            visit(entry.path(), files)?;
        } else if !entry.file_name().starts_with(STAGING_PREFIX) {
            files.push(entry.path().to_owned())
        }
    }

    Ok(())
}
