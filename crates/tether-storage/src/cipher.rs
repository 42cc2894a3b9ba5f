//! Authenticated encryption for individual credential values.
//!
//! Ciphertext layout: `enc:v1:<kind>:<base64url(nonce || ciphertext || tag)>`.
//! The `enc:v1:` marker makes stored values self-identifying, and the kind is
//! bound as associated data.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tether_core::credentials::CredentialKind;
use thiserror::Error;
use tracing::warn;

use crate::key_provider::{KeyError, KeyMaterial, KeyProvider};

/// Marker every ciphertext starts with.
pub const CIPHERTEXT_MARKER: &str = "enc:v1:";

/// Development-only key used when nothing is configured.
pub const INSECURE_FALLBACK_KEY: &[u8; 32] = b"tether-insecure-development-key!";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("refusing to encrypt an empty value")]
    Empty,
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    /// Tampered data or wrong key.
    #[error("ciphertext failed authentication")]
    Authentication,
}

/// AES-256-GCM cipher holding the process-wide credential key.
pub struct SecretCipher {
    cipher: Aes256Gcm,
    key_id: String,
}

impl SecretCipher {
    pub fn new(material: &KeyMaterial) -> Self {
        Self {
            cipher: Aes256Gcm::new((&material.bytes).into()),
            key_id: material.id.clone(),
        }
    }

    /// Build from a key provider, falling back to the insecure development
    /// key when none is configured.
    pub fn from_provider(provider: &dyn KeyProvider) -> Result<Self, KeyError> {
        match provider.load()? {
            Some(material) => Ok(Self::new(&material)),
            None => {
                warn!(
                    "no encryption key configured; using the INSECURE built-in development key. \
                     Set TETHER_ENCRYPTION_KEY before storing real credentials"
                );
                Ok(Self::new(&KeyMaterial {
                    id: "insecure-fallback".to_string(),
                    bytes: *INSECURE_FALLBACK_KEY,
                }))
            }
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypt with a fresh random nonce; two calls on the same input differ.
    pub fn encrypt(&self, plaintext: &str, kind: CredentialKind) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Err(CipherError::Empty);
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: kind.as_str().as_bytes(),
                },
            )
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&sealed);
        Ok(format!(
            "{CIPHERTEXT_MARKER}{kind}:{}",
            URL_SAFE_NO_PAD.encode(blob)
        ))
    }

    pub fn decrypt(&self, value: &str) -> Result<String, CipherError> {
        let (kind, blob) = parse_envelope(value)?;
        let (nonce, sealed) = blob.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: kind.as_str().as_bytes(),
                },
            )
            .map_err(|_| CipherError::Authentication)?;

        String::from_utf8(plaintext)
            .map_err(|e| CipherError::Malformed(format!("plaintext is not utf-8: {e}")))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Structural check for the ciphertext marker. Never decrypts.
pub fn is_encrypted(value: &str) -> bool {
    parse_envelope(value).is_ok()
}

fn parse_envelope(value: &str) -> Result<(CredentialKind, Vec<u8>), CipherError> {
    let rest = value
        .strip_prefix(CIPHERTEXT_MARKER)
        .ok_or_else(|| CipherError::Malformed("missing ciphertext marker".to_string()))?;
    let (kind, body) = rest
        .split_once(':')
        .ok_or_else(|| CipherError::Malformed("missing credential kind".to_string()))?;
    let kind: CredentialKind = kind.parse().map_err(CipherError::Malformed)?;
    let blob = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|e| CipherError::Malformed(format!("body decode failed: {e}")))?;
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::Malformed("ciphertext truncated".to_string()));
    }
    Ok((kind, blob))
}
