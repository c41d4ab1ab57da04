use std::collections::HashMap;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Maps a human address to a network identity.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Option<PublicKey>>;
}

#[derive(Debug, Deserialize)]
struct Nip05Document {
    #[serde(default)]
    names: HashMap<String, String>,
}

/// NIP-05 lookups (`name@domain`). Bech32 and hex keys resolve offline.
pub struct Nip05Resolver {
    client: reqwest::Client,
}

impl Default for Nip05Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Nip05Resolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

/// Split `name@domain`; a bare `@domain` or `_@domain` is the root name.
/// NIP-05 names are case-insensitive, so both parts come back lowercased.
fn split_address(address: &str) -> Option<(String, String)> {
    let (name, domain) = address.trim().rsplit_once('@')?;
    if domain.is_empty() || domain.contains('/') {
        return None;
    }
    let name = if name.is_empty() { "_" } else { name };
    Some((name.to_lowercase(), domain.to_lowercase()))
}

fn lookup_url(name: &str, domain: &str) -> Result<reqwest::Url> {
    reqwest::Url::parse_with_params(
        &format!("https://{}/.well-known/nostr.json", domain),
        &[("name", name)],
    )
    .map_err(|e| CoreError::Transport {
        message: format!("invalid NIP-05 domain {}: {}", domain, e),
    })
}

#[async_trait]
impl AddressResolver for Nip05Resolver {
    async fn resolve(&self, address: &str) -> Result<Option<PublicKey>> {
        if let Ok(pk) = PublicKey::parse(address.trim()) {
            return Ok(Some(pk));
        }
        let Some((name, domain)) = split_address(address) else {
            return Ok(None);
        };

        let url = lookup_url(&name, &domain)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(CoreError::transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CoreError::Transport {
                message: format!("NIP-05 lookup for {} failed: {}", address, response.status()),
            });
        }

        let doc: Nip05Document = response.json().await.map_err(CoreError::transport)?;
        let resolved = doc
            .names
            .get(&name)
            .and_then(|hex| PublicKey::from_hex(hex).ok());
        debug!(address, found = resolved.is_some(), "NIP-05 lookup");
        Ok(resolved)
    }
}
