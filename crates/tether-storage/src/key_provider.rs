use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose, Engine as _};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};
use thiserror::Error;
use tracing::warn;

/// Length of the AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Key material used for credential encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LEN],
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Supplies the process-wide encryption key. `Ok(None)` means no key is
/// configured and the caller decides what to fall back to.
pub trait KeyProvider: Send + Sync {
    fn load(&self) -> Result<Option<KeyMaterial>, KeyError>;
}

/// Key given as a string (environment variable or config file).
#[derive(Clone)]
pub struct StaticKeyProvider {
    id: String,
    value: Option<String>,
}

impl StaticKeyProvider {
    pub fn new(id: impl Into<String>, value: Option<String>) -> Self {
        Self {
            id: id.into(),
            value: value.filter(|v| !v.is_empty()),
        }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn load(&self) -> Result<Option<KeyMaterial>, KeyError> {
        Ok(self.value.as_deref().map(|raw| KeyMaterial {
            id: self.id.clone(),
            bytes: normalize_key(raw),
        }))
    }
}

/// First provider that yields a key wins.
pub struct ChainKeyProvider {
    providers: Vec<Box<dyn KeyProvider>>,
}

impl ChainKeyProvider {
    pub fn new(providers: Vec<Box<dyn KeyProvider>>) -> Self {
        Self { providers }
    }
}

impl KeyProvider for ChainKeyProvider {
    fn load(&self) -> Result<Option<KeyMaterial>, KeyError> {
        for provider in &self.providers {
            if let Some(material) = provider.load()? {
                return Ok(Some(material));
            }
        }
        Ok(None)
    }
}

/// OS keyring-backed provider. Creates and stores a random key on first use.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl KeyProvider for KeyringProvider {
    fn load(&self) -> Result<Option<KeyMaterial>, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        if let Ok(secret) = entry.get_password() {
            return decode_key(&secret).map(Some);
        }

        let material = generate_key();
        entry
            .set_password(&encode_key(&material))
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        Ok(Some(material))
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

impl KeyProvider for InMemoryKeyProvider {
    fn load(&self) -> Result<Option<KeyMaterial>, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(Some(existing));
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(Some(material))
    }
}

/// Pad with zero bytes or truncate so any configured string is a usable key.
pub fn normalize_key(raw: &str) -> [u8; KEY_LEN] {
    let bytes = raw.as_bytes();
    if bytes.len() < KEY_LEN {
        warn!(
            len = bytes.len(),
            "encryption key shorter than {KEY_LEN} bytes; padding with zeros"
        );
    } else if bytes.len() > KEY_LEN {
        warn!(
            len = bytes.len(),
            "encryption key longer than {KEY_LEN} bytes; truncating"
        );
    }

    let mut out = [0u8; KEY_LEN];
    let n = bytes.len().min(KEY_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Fresh random key string of exactly [`KEY_LEN`] ASCII characters, suitable
/// for `TETHER_ENCRYPTION_KEY` without normalization.
pub fn generate_key_string() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(KEY_LEN)
        .map(char::from)
        .collect()
}

fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: "keyring".to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != KEY_LEN {
        return Err(KeyError::Decode(format!(
            "expected {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial {
        id: "keyring".to_string(),
        bytes: out,
    })
}
