use std::{path::PathBuf, sync::Arc};

use color_eyre::Result;
use dirs::data_dir;
use tether_providers::StoredProviderRepo;
use tether_storage::{
    file_store::FileRecordStore,
    key_provider::{ChainKeyProvider, KeyProvider, KeyringProvider, StaticKeyProvider},
    CredentialMiddleware, SecretCipher,
};
use tracing::debug;

use crate::config::{Config, KeySource};

/// Environment variable holding the credential key.
pub const KEY_ENV: &str = "TETHER_ENCRYPTION_KEY";
const KEYRING_SERVICE: &str = "tether";
const KEYRING_ACCOUNT: &str = "credential-key";

pub type ProviderRepo = StoredProviderRepo<FileRecordStore>;

/// Resolve the default data directory for Tether.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("tether"))
}

pub fn store_from_config(config: &Config) -> Result<FileRecordStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "initializing record store");
    Ok(FileRecordStore::new(root))
}

/// Key sources in precedence order: env, config, then the OS keyring if selected.
pub fn key_sources(config: &Config) -> ChainKeyProvider {
    let mut sources: Vec<Box<dyn KeyProvider>> = vec![
        Box::new(StaticKeyProvider::new("env", std::env::var(KEY_ENV).ok())),
        Box::new(StaticKeyProvider::new(
            "config",
            config.encryption_key.clone(),
        )),
    ];
    if config.key_source == KeySource::Keyring {
        sources.push(Box::new(KeyringProvider::new(
            KEYRING_SERVICE,
            KEYRING_ACCOUNT,
        )));
    }
    ChainKeyProvider::new(sources)
}

pub fn middleware_from_config(config: &Config) -> Result<Arc<CredentialMiddleware>> {
    let cipher = SecretCipher::from_provider(&key_sources(config))?;
    debug!(key = cipher.key_id(), "credential cipher ready");
    Ok(Arc::new(CredentialMiddleware::new(Arc::new(cipher))))
}

pub fn repo_from_config(config: &Config) -> Result<Arc<ProviderRepo>> {
    let store = store_from_config(config)?;
    let middleware = middleware_from_config(config)?;
    Ok(Arc::new(StoredProviderRepo::new(store, middleware)))
}

/// Helper for tests: a file-backed repository under `root` with a fixed key.
#[cfg(test)]
pub fn test_repo(root: impl Into<PathBuf>) -> ProviderRepo {
    let cipher = SecretCipher::from_provider(&StaticKeyProvider::new(
        "test",
        Some("tether-test-key".into()),
    ))
    .expect("cipher");
    StoredProviderRepo::new(
        FileRecordStore::new(root),
        Arc::new(CredentialMiddleware::new(Arc::new(cipher))),
    )
}
