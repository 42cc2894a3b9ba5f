use thiserror::Error;

use crate::providers::ProviderType;

/// Errors surfaced by provider storage and connection verification.
///
/// Probe failures and probe timeouts are not represented here: they are
/// reported inside [`crate::connection::ConnectionResult`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TetherError {
    /// Malformed id or input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Record absent or not owned by the acting user. The two cases are
    /// deliberately indistinguishable.
    #[error("provider not found")]
    NotFound,
    /// Write-time cipher failure; the whole write is aborted.
    #[error("failed to encrypt {field}: {reason}")]
    Encryption { field: String, reason: String },
    /// Read-time cipher failure for one field. Record-level reads absorb
    /// these and leave the field empty.
    #[error("failed to decrypt {field}: {reason}")]
    Decryption { field: String, reason: String },
    /// The provider's protocol family is not wired for verification.
    #[error("provider type `{0}` is not supported for connection testing")]
    UnsupportedProvider(ProviderType),
    /// Phase A (remote definition) failed; never classified.
    #[error("failed to create remote definition: {0}")]
    RemoteRegistration(String),
    /// Underlying record store failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl TetherError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage<E: ToString>(err: E) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }
}
