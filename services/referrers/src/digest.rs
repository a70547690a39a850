//! Content digests

use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256, Sha512};

/// Errors produced while parsing a digest string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// The string is not of the form `algorithm:hex`
    #[error("invalid digest format: {0:?}")]
    InvalidFormat(String),

    /// The algorithm is not one this registry can verify
    #[error("unsupported digest algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    /// The encoded portion has the wrong length or characters
    #[error("invalid {algorithm} digest encoding: {hex:?}")]
    InvalidEncoding {
        /// Algorithm named in the digest
        algorithm: Algorithm,
        /// The rejected encoded portion
        hex: String,
    },
}

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    /// SHA-256, the canonical algorithm
    Sha256,
    /// SHA-512
    Sha512,
}

impl Algorithm {
    /// The algorithm identifier used in digest strings and storage paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }

    fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(DigestError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// An algorithm-tagged content digest, e.g. `sha256:e3b0c442...`
///
/// Digests order by algorithm, then by hex encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// Parse and validate a digest string
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| DigestError::InvalidFormat(s.to_string()))?;
        if algorithm.is_empty() || hex.is_empty() {
            return Err(DigestError::InvalidFormat(s.to_string()));
        }
        Self::from_parts(algorithm.parse()?, hex)
    }

    /// Build a digest from an algorithm and its lowercase hex encoding
    pub fn from_parts(algorithm: Algorithm, hex: &str) -> Result<Self, DigestError> {
        let valid = hex.len() == algorithm.hex_len()
            && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(DigestError::InvalidEncoding {
                algorithm,
                hex: hex.to_string(),
            });
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// Compute the canonical (sha256) digest of some content
    pub fn from_bytes(content: &[u8]) -> Self {
        Self::compute(Algorithm::Sha256, content)
    }

    /// Compute the digest of some content with a specific algorithm
    pub fn compute(algorithm: Algorithm, content: &[u8]) -> Self {
        let hex = match algorithm {
            Algorithm::Sha256 => hex::encode(Sha256::digest(content)),
            Algorithm::Sha512 => hex::encode(Sha512::digest(content)),
        };
        Self { algorithm, hex }
    }

    /// The digest algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex encoded hash
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.to_string()
    }
}
