use std::error::Error as StdError;
use std::fmt;

use tracing_error::SpanTrace;

/// What went wrong in a storage backend, independent of which backend.
///
/// The registry only ever branches on [`StorageErrorKind::NotFound`]: a
/// missing object or an empty prefix means "nothing stored here", and every
/// other kind is a failure to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// No object exists at the path, or nothing exists under the prefix.
    NotFound,

    /// The backend refused access.
    PermissionDenied,

    /// Reading or writing the backing medium failed.
    Io,

    /// The path or content cannot be stored as given.
    InvalidRequest,

    /// Anything else.
    Other,
}

impl From<std::io::ErrorKind> for StorageErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            std::io::ErrorKind::InvalidInput => StorageErrorKind::InvalidRequest,
            _ => StorageErrorKind::Io,
        }
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::PermissionDenied => "permission denied",
            StorageErrorKind::Io => "I/O error",
            StorageErrorKind::InvalidRequest => "invalid request",
            StorageErrorKind::Other => "other error",
        })
    }
}

/// A storage failure, tagged with its kind, the driver that raised it and
/// the tracing span it was raised in.
///
/// ```rust
/// use storage_driver::{StorageError, StorageErrorKind};
///
/// let error = StorageError::builder(
///     "local",
///     StorageErrorKind::NotFound,
///     std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
/// )
/// .path("docker/registry/v2/repositories/app/_refs/subjects")
/// .context("walk")
/// .build();
///
/// assert!(error.is_not_found());
/// ```
#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,
    driver: &'static str,
    path: Option<String>,
    context: Option<String>,
    source: Box<dyn StdError + Send + Sync + 'static>,
    span_trace: SpanTrace,
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl StorageError {
    /// Create a not-found error for `path`.
    pub fn not_found(driver: &'static str, path: impl Into<String>) -> Self {
        let path = path.into();
        Self::builder(
            driver,
            StorageErrorKind::NotFound,
            format!("path not found: {path}"),
        )
        .path(path)
        .build()
    }

    /// Start an error of `kind` raised by `driver`.
    pub fn builder<E>(driver: &'static str, kind: StorageErrorKind, error: E) -> StorageErrorBuilder
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        StorageErrorBuilder {
            kind,
            driver,
            source: error.into(),
            path: None,
            context: None,
        }
    }

    /// An adapter for `map_err` that wraps any error as `kind`.
    ///
    /// ```rust
    /// use storage_driver::{StorageError, StorageErrorKind};
    ///
    /// fn parse() -> Result<u32, StorageError> {
    ///     "12x"
    ///         .parse::<u32>()
    ///         .map_err(StorageError::with("local", StorageErrorKind::InvalidRequest))
    /// }
    /// assert!(parse().is_err());
    /// ```
    pub fn with<E>(driver: &'static str, kind: StorageErrorKind) -> impl FnOnce(E) -> StorageError
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        move |error: E| StorageError::builder(driver, kind, error).build()
    }

    /// The kind of failure.
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Whether this error means "nothing stored at the requested path".
    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }

    /// The driver that raised the error.
    pub fn driver(&self) -> &'static str {
        self.driver
    }

    /// The path involved, if known.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The tracing spans active when the error was built.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} driver", self.kind, self.driver)?;
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        if let Some(context) = &self.context {
            write!(f, " during {context}")?;
        }
        write!(f, ": {}", self.source)
    }
}

/// Adds a path and context to a [`StorageError`].
#[derive(Debug)]
pub struct StorageErrorBuilder {
    kind: StorageErrorKind,
    driver: &'static str,
    source: Box<dyn StdError + Send + Sync + 'static>,
    path: Option<String>,
    context: Option<String>,
}

impl StorageErrorBuilder {
    /// The path being accessed.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// What the driver was doing.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Finish the error, capturing the current span.
    pub fn build(self) -> StorageError {
        StorageError {
            kind: self.kind,
            driver: self.driver,
            path: self.path,
            context: self.context,
            source: self.source,
            span_trace: SpanTrace::capture(),
        }
    }
}
