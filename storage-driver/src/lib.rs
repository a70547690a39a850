//! # Storage drivers
//!
//! The path-keyed driver contract shared by every registry storage backend.

mod driver;
mod error;

pub use driver::Driver;
pub use driver::Metadata;
pub use error::{StorageError, StorageErrorBuilder, StorageErrorKind};
