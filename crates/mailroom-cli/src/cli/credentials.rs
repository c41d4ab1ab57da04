use anyhow::{anyhow, bail, Context, Result};
use nostr_sdk::prelude::*;
use tracing::info;

use super::config::Credentials;
use super::secure_storage::{SecureKey, SecureStorage, SecureStorageError};

/// Environment variable consulted for the ncryptsec password when the
/// config file does not carry one.
pub const PASSWORD_ENV: &str = "MAILROOM_PASSWORD";

/// Decode an nsec or ncryptsec key into signing keys.
pub fn parse_key(key: &str, password: Option<&str>) -> Result<Keys> {
    let secret_key = if key.starts_with("ncryptsec") {
        let password = password.ok_or_else(|| anyhow!("Password required for ncryptsec key"))?;
        let encrypted =
            EncryptedSecretKey::from_bech32(key).context("Invalid ncryptsec key")?;
        encrypted
            .decrypt(password)
            .map_err(|e| anyhow!("Failed to decrypt key: {}", e))?
    } else if key.starts_with("nsec") {
        SecretKey::from_bech32(key).context("Invalid nsec key")?
    } else {
        bail!("Invalid key format: expected nsec or ncryptsec");
    };
    Ok(Keys::new(secret_key))
}

/// Resolve keys from config credentials first, then from the OS keyring.
pub fn load_keys(credentials: Option<&Credentials>) -> Result<Keys> {
    let env_password = std::env::var(PASSWORD_ENV).ok();

    if let Some(creds) = credentials {
        let password = creds.password.as_deref().or(env_password.as_deref());
        return parse_key(&creds.key, password);
    }

    match SecureStorage::get(SecureKey::IdentityKey) {
        Ok(stored) => parse_key(&stored, env_password.as_deref()),
        Err(SecureStorageError::KeyNotFound(_)) => {
            bail!("No credentials configured. Run `mailroom login` or set credentials in the config file")
        }
        Err(e) => Err(e.into()),
    }
}

/// Validate a key and store it in the keyring. With a password the key is
/// stored as ncryptsec.
pub fn store_key(key: &str, password: Option<&str>) -> Result<PublicKey> {
    let keys = parse_key(key, password)?;
    let stored = match password {
        Some(pwd) if !key.starts_with("ncryptsec") => keys
            .secret_key()
            .encrypt(pwd)
            .map_err(|e| anyhow!("Failed to encrypt key: {}", e))?
            .to_bech32()
            .map_err(|e| anyhow!("Failed to encode ncryptsec: {}", e))?,
        _ => key.to_string(),
    };
    SecureStorage::set(SecureKey::IdentityKey, &stored)?;
    info!(pubkey = %keys.public_key(), "Stored identity key");
    Ok(keys.public_key())
}

pub fn forget_key() -> Result<()> {
    SecureStorage::delete(SecureKey::IdentityKey)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nsec() {
        let keys = Keys::generate();
        let nsec = keys.secret_key().to_bech32().unwrap();
        let parsed = parse_key(&nsec, None).unwrap();
        assert_eq!(parsed.public_key(), keys.public_key());
    }

    #[test]
    fn test_parse_ncryptsec_requires_password() {
        let keys = Keys::generate();
        let ncryptsec = keys.secret_key().encrypt("hunter2").unwrap().to_bech32().unwrap();

        assert!(parse_key(&ncryptsec, None).is_err());
        assert!(parse_key(&ncryptsec, Some("wrong")).is_err());
        let parsed = parse_key(&ncryptsec, Some("hunter2")).unwrap();
        assert_eq!(parsed.public_key(), keys.public_key());
    }

    #[test]
    fn test_parse_rejects_other_formats() {
        let keys = Keys::generate();
        let err = parse_key(&keys.public_key().to_hex(), None).unwrap_err();
        assert!(err.to_string().contains("expected nsec or ncryptsec"));
    }

    #[test]
    fn test_config_credentials_take_priority() {
        let keys = Keys::generate();
        let creds = Credentials {
            key: keys.secret_key().to_bech32().unwrap(),
            password: None,
        };
        let loaded = load_keys(Some(&creds)).unwrap();
        assert_eq!(loaded.public_key(), keys.public_key());
    }
}
