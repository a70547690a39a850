//! Server configuration

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::Deserialize;
use storage::StorageConfig;

/// Configuration for a registry server
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Address to serve on
    pub listen: SocketAddr,

    /// Storage backend
    pub storage: StorageConfig,

    /// Extensions to enable, by name, with their options
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            storage: StorageConfig::default(),
            extensions: BTreeMap::new(),
        }
    }
}

#[cfg(feature = "cli")]
impl RegistryConfig {
    /// Parse a TOML configuration document
    pub fn from_toml(document: &str) -> Result<Self, toml_edit::de::Error> {
        toml_edit::de::from_str(document)
    }
}
