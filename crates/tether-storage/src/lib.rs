//! Credential protection and storage backends.
//! Secrets are sealed with AES-256-GCM before any record reaches a store, and
//! opened again when records are read back.

pub mod cipher;
pub mod file_store;
pub mod key_provider;
pub mod middleware;

pub use cipher::{is_encrypted, CipherError, SecretCipher};
pub use middleware::CredentialMiddleware;
