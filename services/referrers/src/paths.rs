//! Storage key layout
//!
//! Every key lives under `docker/registry/v2`, matching the layout used by
//! existing distribution deployments:
//!
//! ```text
//! blobs/{alg}/{hex[0..2]}/{hex}/data
//! repositories/{name}/_layers/{alg}/{hex}/link
//! repositories/{name}/_manifests/revisions/{alg}/{hex}/link
//! repositories/{name}/_refs/subjects/{subject-alg}/{subject-hex}/{alg}/{hex}/link
//! ```

use camino::Utf8PathBuf;

use crate::digest::Digest;

const ROOT: &str = "docker/registry/v2";

/// File name of a link object
pub const LINK_FILE: &str = "link";

/// Where the bytes of a blob live
pub fn blob_data(digest: &Digest) -> Utf8PathBuf {
    let hex = digest.hex();
    Utf8PathBuf::from(format!(
        "{ROOT}/blobs/{}/{}/{hex}/data",
        digest.algorithm(),
        &hex[..2]
    ))
}

/// Root of everything stored for one repository
pub fn repository(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{ROOT}/repositories/{name}"))
}

/// Link root for blobs (layers and configs) uploaded to a repository
pub fn layers(name: &str) -> Utf8PathBuf {
    repository(name).join("_layers")
}

/// Link root for manifest revisions stored in a repository
pub fn manifest_revisions(name: &str) -> Utf8PathBuf {
    repository(name).join("_manifests/revisions")
}

/// Parent of every per-subject referrers root in a repository
pub fn referrer_subjects(name: &str) -> Utf8PathBuf {
    repository(name).join("_refs/subjects")
}
