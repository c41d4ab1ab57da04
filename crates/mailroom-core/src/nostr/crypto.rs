use async_trait::async_trait;
use nostr_sdk::nips::nip59::UnwrappedGift;
use nostr_sdk::prelude::*;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Terminal decryption outcomes. A transient failure is `Ok(None)` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptError {
    /// The user declined; the envelope stays unprocessed
    #[error("Decryption cancelled by user")]
    Cancelled,
    /// The signer refused; the envelope will never be retried
    #[error("Decryption rejected by signer: {0}")]
    Rejected(String),
}

/// Signing and envelope cryptography.
#[async_trait]
pub trait EnvelopeCrypto: Send + Sync {
    async fn sign(&self, unsigned: UnsignedEvent) -> Result<Event>;

    /// Open a gift wrap and return its rumor.
    async fn decrypt(&self, envelope: &Event) -> Result<Option<UnsignedEvent>, DecryptError>;

    /// Seal `rumor` and wrap it for `recipient`.
    async fn encrypt_for(&self, rumor: UnsignedEvent, recipient: &PublicKey) -> Result<Event>;
}

/// Crypto backed by locally held keys. Never cancels or rejects.
#[derive(Clone)]
pub struct KeysCrypto {
    keys: Keys,
}

impl KeysCrypto {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }
}

#[async_trait]
impl EnvelopeCrypto for KeysCrypto {
    async fn sign(&self, unsigned: UnsignedEvent) -> Result<Event> {
        if unsigned.pubkey != self.keys.public_key() {
            return Err(CoreError::crypto(format!(
                "event author {} does not match signing key",
                unsigned.pubkey
            )));
        }
        unsigned
            .sign_with_keys(&self.keys)
            .map_err(CoreError::crypto)
    }

    async fn decrypt(&self, envelope: &Event) -> Result<Option<UnsignedEvent>, DecryptError> {
        match UnwrappedGift::from_gift_wrap(&self.keys, envelope).await {
            Ok(gift) => Ok(Some(gift.rumor)),
            Err(e) => {
                debug!(envelope_id = %envelope.id, error = %e, "Gift wrap did not open");
                Ok(None)
            }
        }
    }

    async fn encrypt_for(&self, rumor: UnsignedEvent, recipient: &PublicKey) -> Result<Event> {
        EventBuilder::gift_wrap(&self.keys, recipient, rumor, Vec::<Tag>::new())
            .await
            .map_err(CoreError::crypto)
    }
}
