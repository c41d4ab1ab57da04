//! Keyring slot for the mailbox owner's secret key.
//!
//! `mailroom login` writes the nsec (or, with a password, an ncryptsec) here
//! so later commands can open the mailbox without a credentials block in
//! the config file. The OS keyring backs it: Keychain on macOS, Secret
//! Service on Linux, Credential Manager on Windows.

use keyring::Entry;
use std::fmt;

/// Keyring service every mailroom entry lives under.
const SERVICE_NAME: &str = "com.mailroom.cli";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureKey {
    /// Bech32 secret of the mailbox owner, as `nsec1...` or `ncryptsec1...`
    IdentityKey,
}

impl SecureKey {
    fn key_name(&self) -> &'static str {
        match self {
            SecureKey::IdentityKey => "identity_key",
        }
    }
}

impl fmt::Display for SecureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecureStorageError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Nobody has run `mailroom login` on this machine yet
    #[error("Key not found: {0}")]
    KeyNotFound(SecureKey),
}

/// Stateless accessor; every call opens the keyring entry afresh.
pub struct SecureStorage;

impl SecureStorage {
    /// Replace whatever secret is stored under `key`.
    pub fn set(key: SecureKey, value: &str) -> Result<(), SecureStorageError> {
        let entry = Entry::new(SERVICE_NAME, key.key_name())?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn get(key: SecureKey) -> Result<String, SecureStorageError> {
        let entry = Entry::new(SERVICE_NAME, key.key_name())?;
        match entry.get_password() {
            Ok(value) => Ok(value),
            Err(keyring::Error::NoEntry) => Err(SecureStorageError::KeyNotFound(key)),
            Err(e) => Err(SecureStorageError::Keyring(e)),
        }
    }

    /// Used by `mailroom logout`. Deleting a missing entry succeeds.
    pub fn delete(key: SecureKey) -> Result<(), SecureStorageError> {
        let entry = Entry::new(SERVICE_NAME, key.key_name())?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SecureStorageError::Keyring(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(SecureKey::IdentityKey.to_string(), "identity_key");
    }

    #[test]
    fn test_not_found_error_message() {
        let err = SecureStorageError::KeyNotFound(SecureKey::IdentityKey);
        assert_eq!(err.to_string(), "Key not found: identity_key");
    }
}
