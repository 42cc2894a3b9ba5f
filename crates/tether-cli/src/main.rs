mod cli;
mod config;
mod providers;
mod storage;
mod verify;

use clap::Parser;
use color_eyre::Result;
use tether_core::{
    credentials::CredentialKind,
    storage::{RecordStore, StoreError},
};
use tether_storage::{key_provider::generate_key_string, SecretCipher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand, KeyCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Health => run_health_check(&config).await?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Key(KeyCommand::Generate) => println!("{}", generate_key_string()),
        Command::Provider(cmd) => providers::handle(cmd, &config).await?,
        Command::Test { id, user } => verify::handle(&id, &user, &config).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("tether {}", env!("CARGO_PKG_VERSION"));
}

/// Checks that the configured key encrypts and decrypts, and that the record
/// store accepts a write.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let middleware = storage::middleware_from_config(config)?;
    check_cipher(middleware.cipher())?;
    println!("Cipher: ok ({})", middleware.cipher().key_id());

    let store = storage::store_from_config(config)?;
    run_store_health(&store).await?;
    println!("Storage: ok");
    Ok(())
}

fn check_cipher(cipher: &SecretCipher) -> Result<()> {
    let probe = "health-probe";
    let sealed = cipher.encrypt(probe, CredentialKind::Generic)?;
    if cipher.decrypt(&sealed)? != probe {
        color_eyre::eyre::bail!("cipher round-trip failed");
    }
    Ok(())
}

async fn run_store_health<S: RecordStore>(store: &S) -> Result<()> {
    let probe_key = "health/probe";
    let payload = b"ok";
    store.put(probe_key, payload).await?;
    let round_trip = store.get(probe_key).await?;
    store.delete(probe_key).await?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    match store.get(probe_key).await {
        Err(StoreError::NotFound { .. }) => Ok(()),
        Ok(_) => color_eyre::eyre::bail!("storage delete did not take effect"),
        Err(err) => Err(err.into()),
    }
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use tether_storage::{file_store::FileRecordStore, key_provider::StaticKeyProvider};

    use super::*;

    #[tokio::test]
    async fn health_check_with_test_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        run_store_health(&store)
            .await
            .expect("health check should succeed");
    }

    #[test]
    fn cipher_check_passes_for_configured_key() {
        let cipher = SecretCipher::from_provider(&StaticKeyProvider::new(
            "test",
            Some("health".into()),
        ))
        .expect("cipher");
        check_cipher(&cipher).expect("round trip");
    }
}
