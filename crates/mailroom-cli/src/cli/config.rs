use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mailroom_core::CoreConfig;
use serde::{Deserialize, Serialize};

const DATA_DIR_NAME: &str = ".mailroom";

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Where the mailbox database lives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relays: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_namespace: Option<String>,

    /// Credentials for nostr authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

/// Nostr credentials configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// nsec (unencrypted) or ncryptsec (encrypted) key
    pub key: String,

    /// Password for ncryptsec decryption (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Engine config with CLI overrides applied on top of the defaults.
    pub fn core_config(&self) -> CoreConfig {
        let mut core = CoreConfig::new(
            self.data_dir
                .clone()
                .unwrap_or_else(default_data_dir),
        );
        if !self.relays.is_empty() {
            core.relays = self.relays.clone();
        }
        if let Some(ref namespace) = self.label_namespace {
            core.label_namespace = namespace.clone();
        }
        core
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_with_credentials() {
        let json = r#"{
            "dataDir": "/tmp/mailroom-test",
            "relays": ["wss://relay.example"],
            "credentials": {
                "key": "nsec1abc123",
                "password": "secret"
            }
        }"#;
        let config: CliConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/mailroom-test")));
        let creds = config.credentials.unwrap();
        assert_eq!(creds.key, "nsec1abc123");
        assert_eq!(creds.password, Some("secret".to_string()));
    }

    #[test]
    fn test_parse_config_minimal() {
        let config: CliConfig = serde_json::from_str("{}").unwrap();
        assert!(config.data_dir.is_none());
        assert!(config.relays.is_empty());
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_core_config_overrides() {
        let config = CliConfig {
            data_dir: Some(PathBuf::from("/tmp/box")),
            relays: vec!["wss://relay.example".to_string()],
            label_namespace: Some("work".to_string()),
            credentials: None,
        };
        let core = config.core_config();
        assert_eq!(core.data_dir, PathBuf::from("/tmp/box"));
        assert_eq!(core.relays, vec!["wss://relay.example".to_string()]);
        assert_eq!(core.label_namespace, "work");

        let defaults = CliConfig::default().core_config();
        assert_eq!(defaults.data_dir, default_data_dir());
        assert!(!defaults.relays.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"labelNamespace": "personal"}"#).unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.label_namespace.as_deref(), Some("personal"));
        assert!(CliConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
