use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{BROADCAST_TIMEOUT_SECS, LABEL_NAMESPACE, QUERY_TIMEOUT_SECS, RELAY_URL};

/// Engine configuration, loadable from a camelCase JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub relays: Vec<String>,
    /// NIP-32 namespace that label assertions must carry to be reconciled
    pub label_namespace: String,
    pub query_timeout_secs: u64,
    pub broadcast_timeout_secs: u64,
    /// Local identity (npub or hex). Identity-dependent calls fail without it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relays = relays.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize config")
    }

    /// Parse the configured identity, if any.
    pub fn identity_key(&self) -> Result<Option<PublicKey>> {
        self.identity
            .as_deref()
            .map(|s| PublicKey::parse(s).with_context(|| format!("Invalid identity: {}", s)))
            .transpose()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.broadcast_timeout_secs)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("mailroom_data"),
            relays: vec![RELAY_URL.to_string()],
            label_namespace: LABEL_NAMESPACE.to_string(),
            query_timeout_secs: QUERY_TIMEOUT_SECS,
            broadcast_timeout_secs: BROADCAST_TIMEOUT_SECS,
            identity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = CoreConfig::from_json("{}").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("mailroom_data"));
        assert_eq!(config.relays, vec![RELAY_URL.to_string()]);
        assert_eq!(config.label_namespace, LABEL_NAMESPACE);
        assert!(config.identity.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "dataDir": "/tmp/mailroom",
            "relays": ["wss://a.example", "wss://b.example"],
            "labelNamespace": "work",
            "queryTimeoutSecs": 3,
            "broadcastTimeoutSecs": 2
        }"#;
        let config = CoreConfig::from_json(json).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/mailroom"));
        assert_eq!(config.relays.len(), 2);
        assert_eq!(config.label_namespace, "work");
        assert_eq!(config.query_timeout(), Duration::from_secs(3));
        assert_eq!(config.broadcast_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_identity_key_accepts_hex_and_rejects_garbage() {
        let keys = Keys::generate();
        let config = CoreConfig::default().with_identity(keys.public_key().to_hex());
        assert_eq!(config.identity_key().unwrap(), Some(keys.public_key()));

        let bad = CoreConfig::default().with_identity("not-a-key");
        assert!(bad.identity_key().is_err());
    }
}
