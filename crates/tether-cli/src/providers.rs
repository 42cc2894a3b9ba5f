use color_eyre::Result;
use tether_core::{
    providers::{redacted, Provider, ProviderType},
    repository::ProviderRepository,
};

use crate::{
    cli::{AddProvider, ProviderCommand},
    config, storage,
};

/// Execute a provider subcommand against the configured store.
pub async fn handle(cmd: ProviderCommand, config: &config::Config) -> Result<()> {
    let repo = storage::repo_from_config(config)?;
    run(cmd, repo.as_ref()).await
}

async fn run(cmd: ProviderCommand, repo: &dyn ProviderRepository) -> Result<()> {
    match cmd {
        ProviderCommand::Add(args) => {
            let provider = repo.create(build_provider(args)?).await?;
            println!(
                "Created provider {} ({}): {}",
                provider.id, provider.provider_type, provider.name
            );
        }
        ProviderCommand::List { user } => {
            let providers = repo.list_for_user(user).await?;
            if providers.is_empty() {
                println!("No providers yet. Add one with `tether provider add`.");
                return Ok(());
            }
            for provider in providers {
                println!(
                    "{} [{}] {}",
                    provider.id, provider.provider_type, provider.name
                );
            }
        }
        ProviderCommand::Show { id, user } => {
            let provider = repo.get_for_user(id, user).await?;
            for line in describe(&provider) {
                println!("{line}");
            }
        }
        ProviderCommand::Delete { id, user } => {
            repo.delete_for_user(id, user).await?;
            println!("Deleted provider {id}");
        }
    }
    Ok(())
}

fn build_provider(args: AddProvider) -> Result<Provider> {
    let provider_type: ProviderType = args.provider_type.parse()?;
    let mut provider = Provider::new(args.user, args.name, provider_type);
    provider.host = args.host.unwrap_or_default();
    provider.port = args.port;
    provider.username = args.username.unwrap_or_default();
    provider.password = args.password.unwrap_or_default();
    provider.path = args.path.unwrap_or_default();
    provider.key_file = args.key_file.unwrap_or_default();
    provider.domain = args.domain.unwrap_or_default();
    provider.region = args.region.unwrap_or_default();
    provider.bucket = args.bucket.unwrap_or_default();
    provider.endpoint = args.endpoint.unwrap_or_default();
    provider.access_key = args.access_key.unwrap_or_default();
    provider.secret_key = args.secret_key.unwrap_or_default();
    provider.client_id = args.client_id.unwrap_or_default();
    provider.client_secret = args.client_secret.unwrap_or_default();
    provider.refresh_token = args.refresh_token.unwrap_or_default();
    provider.drive_id = args.drive_id.unwrap_or_default();
    provider.team_drive = args.team_drive.unwrap_or_default();
    provider.explicit_tls = args.explicit_tls;
    provider.force_path_style = args.force_path_style;
    provider.read_only = args.read_only;
    provider.skip_cert_verify = args.skip_cert_verify;
    Ok(provider)
}

/// Human-readable summary; credential values are never printed.
fn describe(provider: &Provider) -> Vec<String> {
    let mut lines = vec![
        format!("id:       {}", provider.id),
        format!("name:     {}", provider.name),
        format!("type:     {}", provider.provider_type),
        format!("owner:    {}", provider.user_id),
        format!("created:  {}", provider.created_at.to_rfc3339()),
        format!("updated:  {}", provider.updated_at.to_rfc3339()),
    ];
    let fields = [
        ("host", &provider.host),
        ("username", &provider.username),
        ("path", &provider.path),
        ("key_file", &provider.key_file),
        ("domain", &provider.domain),
        ("region", &provider.region),
        ("bucket", &provider.bucket),
        ("endpoint", &provider.endpoint),
        ("access_key", &provider.access_key),
        ("client_id", &provider.client_id),
        ("drive_id", &provider.drive_id),
        ("team_drive", &provider.team_drive),
    ];
    lines.extend(
        fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(label, value)| format!("{:<10}{value}", format!("{label}:"))),
    );
    if let Some(port) = provider.port {
        lines.push(format!("port:     {port}"));
    }
    for (label, value) in [
        ("password", &provider.password),
        ("secret_key", &provider.secret_key),
        ("client_secret", &provider.client_secret),
        ("refresh_token", &provider.refresh_token),
    ] {
        if !value.is_empty() {
            lines.push(format!("{:<10}{}", format!("{label}:"), redacted(value)));
        }
    }
    lines
}
