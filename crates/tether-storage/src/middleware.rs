//! Hooks that seal credential pairs before a record is written and open them
//! after it is read, so nothing outside this module handles ciphertext.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tether_core::{credentials::CredentialRecord, error::TetherError};
use tracing::{debug, instrument, warn};

use crate::cipher::{is_encrypted, SecretCipher};

/// Shared encryption middleware.
///
/// The enabled flag is read once at the start of each hook, so a toggle only
/// affects hooks that start after it.
#[derive(Debug)]
pub struct CredentialMiddleware {
    cipher: Arc<SecretCipher>,
    enabled: AtomicBool,
}

impl CredentialMiddleware {
    pub fn new(cipher: Arc<SecretCipher>) -> Self {
        Self {
            cipher,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Write hook. Passes the record through untouched while disabled.
    pub fn before_save<R: CredentialRecord>(&self, record: &mut R) -> Result<(), TetherError> {
        if !self.is_enabled() {
            debug!("credential encryption disabled; writing record as-is");
            return Ok(());
        }
        self.seal(record)
    }

    /// Read hook for a single record.
    pub fn after_fetch<R: CredentialRecord>(&self, record: &mut R) {
        if self.is_enabled() {
            self.open(record);
        }
    }

    /// Read hook for a collection. One unreadable field never hides the
    /// rest of the collection.
    pub fn after_fetch_all<R: CredentialRecord>(&self, records: &mut [R]) {
        if !self.is_enabled() {
            return;
        }
        for record in records.iter_mut() {
            self.open(record);
        }
    }

    /// Encrypt every non-empty plaintext into its ciphertext partner.
    ///
    /// Values that already carry the ciphertext marker are written through
    /// unchanged. Any cipher failure aborts with [`TetherError::Encryption`].
    #[instrument(skip_all, fields(key_id = %self.cipher.key_id()))]
    pub fn seal<R: CredentialRecord>(&self, record: &mut R) -> Result<(), TetherError> {
        for mut pair in record.credential_pairs() {
            if pair.plaintext.is_empty() {
                continue;
            }

            if is_encrypted(pair.plaintext.as_str()) {
                debug!(field = pair.name, "value already encrypted; keeping ciphertext");
                pair.ciphertext.clone_from(&*pair.plaintext);
            } else {
                *pair.ciphertext = self
                    .cipher
                    .encrypt(pair.plaintext.as_str(), pair.kind)
                    .map_err(|e| TetherError::Encryption {
                        field: pair.name.to_string(),
                        reason: e.to_string(),
                    })?;
            }

            if pair.transient {
                pair.plaintext.clear();
            }
        }
        Ok(())
    }

    /// Decrypt every non-empty ciphertext into its plaintext partner and
    /// return how many fields could not be decrypted. Those are logged and
    /// left empty; ciphertext fields are never modified.
    #[instrument(skip_all, fields(key_id = %self.cipher.key_id()))]
    pub fn open<R: CredentialRecord>(&self, record: &mut R) -> usize {
        let mut failures = 0;
        for mut pair in record.credential_pairs() {
            if pair.ciphertext.is_empty() {
                continue;
            }
            match self.decrypt_field(pair.name, pair.ciphertext.as_str()) {
                Ok(plaintext) => *pair.plaintext = plaintext,
                Err(err) => {
                    warn!(field = pair.name, error = %err, "credential field left empty");
                    pair.plaintext.clear();
                    failures += 1;
                }
            }
        }
        failures
    }

    /// Decrypt a single stored value, naming `field` in the error.
    pub fn decrypt_field(&self, field: &str, ciphertext: &str) -> Result<String, TetherError> {
        self.cipher
            .decrypt(ciphertext)
            .map_err(|e| TetherError::Decryption {
                field: field.to_string(),
                reason: e.to_string(),
            })
    }
}
