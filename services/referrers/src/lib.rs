//! # Artifact referrers registry
//!
//! A content-addressed registry that stores artifact manifests alongside
//! image manifests and answers "which artifacts refer to digest D".
//!
//! ## Layout
//!
//! - Blobs are stored once, by digest, in a [`BlobStore`].
//! - Repositories see blobs and manifests through links ([`LinkStore`]).
//! - Storing an artifact manifest links it under its subject in the
//!   [`ReferrersIndex`], which [`ReferrersService`] reads back.
//! - Manifest kinds are pluggable [`ManifestHandler`]s, selected per request
//!   by a [`ManifestDispatcher`].
//! - [`Extension`]s (such as [`OrasExtension`]) add handlers and routes.
//!
//! ## Example
//!
//! ```no_run
//! use referrers::{ExtensionRegistry, RegistryBuilder};
//! use storage::MemoryDriver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = std::collections::BTreeMap::new();
//! config.insert("oras".to_string(), serde_json::json!({ "artifacts": ["referrers"] }));
//!
//! let app = RegistryBuilder::new(MemoryDriver::new().into())
//!     .extensions_from_config(&ExtensionRegistry::with_defaults(), &config)?
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod blob;
mod blobs;
mod config;
mod context;
mod descriptor;
mod digest;
mod error;
mod extension;
mod index;
mod link;
mod manifest;
pub mod manifests;
mod oras;
mod paths;
mod referrers;
mod repository;

#[cfg(test)]
mod testing;

pub use api::RegistryBuilder;
pub use blobs::{BlobStore, LinkedBlobStore};
pub use config::RegistryConfig;
pub use context::RequestContext;
pub use descriptor::{ArtifactDescriptor, Descriptor};
pub use digest::{Algorithm, Digest, DigestError};
pub use error::{RegistryError, RegistryResult, VerificationError};
pub use extension::{ExtendedRoute, Extension, ExtensionFactory, ExtensionRegistry};
pub use index::ReferrersIndex;
pub use link::LinkStore;
pub use manifests::{Manifest, ManifestDispatcher, ManifestHandler, ManifestKind, ManifestStore};
pub use oras::{OrasExtension, OrasOptions, ResponseFormat};
pub use referrers::ReferrersService;
pub use repository::{Registry, Repository};
