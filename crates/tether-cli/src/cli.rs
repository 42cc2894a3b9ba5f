use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "tether",
    about = "Encrypted storage-provider records with connection testing",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Check the cipher and the record store.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Encryption key utilities.
    #[command(subcommand)]
    Key(KeyCommand),
    /// Create, inspect and remove storage providers.
    #[command(subcommand)]
    Provider(ProviderCommand),
    /// Test that a provider can reach its remote. Prints the result as JSON.
    Test {
        /// Provider id.
        id: String,
        /// Acting user; must own the provider.
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    /// Print a fresh random encryption key.
    Generate,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProviderCommand {
    /// Store a new provider.
    Add(AddProvider),
    /// List the providers owned by a user.
    List {
        #[arg(long)]
        user: Uuid,
    },
    /// Show one provider with secrets redacted.
    Show {
        id: Uuid,
        #[arg(long)]
        user: Uuid,
    },
    /// Delete a provider.
    Delete {
        id: Uuid,
        #[arg(long)]
        user: Uuid,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct AddProvider {
    /// Owner of the new provider.
    #[arg(long)]
    pub user: Uuid,
    #[arg(long)]
    pub name: String,
    /// One of local, sftp, ftp, smb, s3, wasabi, minio, b2, onedrive,
    /// google_drive, google_photos.
    #[arg(long = "type")]
    pub provider_type: String,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    /// Local directory, or sub-path on the remote.
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long)]
    pub key_file: Option<String>,
    #[arg(long)]
    pub domain: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub bucket: Option<String>,
    #[arg(long)]
    pub endpoint: Option<String>,
    #[arg(long)]
    pub access_key: Option<String>,
    #[arg(long)]
    pub secret_key: Option<String>,
    #[arg(long)]
    pub client_id: Option<String>,
    #[arg(long)]
    pub client_secret: Option<String>,
    #[arg(long)]
    pub refresh_token: Option<String>,
    #[arg(long)]
    pub drive_id: Option<String>,
    #[arg(long)]
    pub team_drive: Option<String>,
    #[arg(long)]
    pub explicit_tls: Option<bool>,
    #[arg(long)]
    pub force_path_style: Option<bool>,
    #[arg(long)]
    pub read_only: Option<bool>,
    #[arg(long)]
    pub skip_cert_verify: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["tether", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Health);
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["tether", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["tether"]).is_err());
    }

    #[test]
    fn test_keeps_ids_as_text() {
        let cli = Cli::try_parse_from(["tether", "test", "not-a-uuid", "--user", "bob"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Test {
                id: "not-a-uuid".into(),
                user: "bob".into(),
            }
        );
    }

    #[test]
    fn parses_provider_add() {
        let user = Uuid::new_v4();
        let user_arg = user.to_string();
        let cli = Cli::try_parse_from([
            "tether",
            "provider",
            "add",
            "--user",
            user_arg.as_str(),
            "--name",
            "nas",
            "--type",
            "sftp",
            "--host",
            "nas.local",
            "--port",
            "2222",
            "--skip-cert-verify",
            "true",
        ])
        .expect("parse should succeed");
        let Command::Provider(ProviderCommand::Add(add)) = cli.command else {
            panic!("expected provider add");
        };
        assert_eq!(add.user, user);
        assert_eq!(add.provider_type, "sftp");
        assert_eq!(add.host.as_deref(), Some("nas.local"));
        assert_eq!(add.port, Some(2222));
        assert_eq!(add.skip_cert_verify, Some(true));
        assert_eq!(add.password, None);
    }

    #[test]
    fn provider_commands_reject_malformed_user() {
        assert!(Cli::try_parse_from(["tether", "provider", "list", "--user", "nope"]).is_err());
    }
}
