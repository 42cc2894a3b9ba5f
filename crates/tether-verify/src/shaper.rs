//! Maps a decrypted provider record to the minimal set of fields its
//! protocol family needs, so nothing irrelevant reaches the transfer engine.

use std::fmt;

use serde_json::json;
use tether_core::{
    error::TetherError,
    providers::{check_local_path, ProtocolFamily, Provider, ProviderType},
};

/// A secret that prints as `<redacted>` in debug output.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(tether_core::providers::redacted(&self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRemote {
    pub path: String,
}

/// SFTP, FTP and SMB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRemote {
    pub backend: &'static str,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: SecretValue,
    pub key_file: String,
    pub domain: String,
    pub explicit_tls: bool,
    pub skip_cert_verify: bool,
    pub path: String,
}

/// S3-compatible stores and B2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreRemote {
    pub backend: &'static str,
    /// S3 vendor (`AWS`, `Wasabi`, `Minio`); `None` for non-S3 backends.
    pub vendor: Option<&'static str>,
    pub access_key: String,
    pub secret_key: SecretValue,
    pub region: String,
    pub bucket: String,
    pub endpoint: String,
    pub force_path_style: bool,
    pub skip_cert_verify: bool,
    pub path: String,
}

/// OAuth-token drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudDriveRemote {
    pub backend: &'static str,
    pub client_id: String,
    pub client_secret: SecretValue,
    pub refresh_token: SecretValue,
    pub drive_id: String,
    pub team_drive: String,
    pub read_only: bool,
    pub path: String,
}

/// Protocol-specific view of a provider, ready to hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDescriptor {
    Local(LocalRemote),
    Password(PasswordRemote),
    ObjectStore(ObjectStoreRemote),
    CloudDrive(CloudDriveRemote),
}

/// Shape a decrypted provider. Fails for types this build cannot test and for
/// local paths the engine could misread.
pub fn shape(provider: &Provider) -> Result<RemoteDescriptor, TetherError> {
    let family = provider
        .family()
        .ok_or(TetherError::UnsupportedProvider(provider.provider_type))?;

    let descriptor = match family {
        ProtocolFamily::Local => {
            check_local_path(&provider.path)?;
            RemoteDescriptor::Local(LocalRemote {
                path: provider.path.clone(),
            })
        }
        ProtocolFamily::Password => RemoteDescriptor::Password(PasswordRemote {
            backend: match provider.provider_type {
                ProviderType::Ftp => "ftp",
                ProviderType::Smb => "smb",
                _ => "sftp",
            },
            host: provider.host.clone(),
            port: provider.port,
            user: provider.username.clone(),
            password: SecretValue::new(&provider.password),
            key_file: provider.key_file.clone(),
            domain: provider.domain.clone(),
            explicit_tls: provider.explicit_tls(),
            skip_cert_verify: provider.skip_cert_verify(),
            path: provider.path.clone(),
        }),
        ProtocolFamily::ObjectStore => {
            let (backend, vendor) = match provider.provider_type {
                ProviderType::B2 => ("b2", None),
                ProviderType::Wasabi => ("s3", Some("Wasabi")),
                ProviderType::Minio => ("s3", Some("Minio")),
                _ => ("s3", Some("AWS")),
            };
            RemoteDescriptor::ObjectStore(ObjectStoreRemote {
                backend,
                vendor,
                access_key: provider.access_key.clone(),
                secret_key: SecretValue::new(&provider.secret_key),
                region: provider.region.clone(),
                bucket: provider.bucket.clone(),
                endpoint: object_store_endpoint(provider),
                force_path_style: provider.force_path_style(),
                skip_cert_verify: provider.skip_cert_verify(),
                path: provider.path.clone(),
            })
        }
        ProtocolFamily::CloudDrive => RemoteDescriptor::CloudDrive(CloudDriveRemote {
            backend: match provider.provider_type {
                ProviderType::GoogleDrive => "drive",
                ProviderType::GooglePhotos => "google photos",
                _ => "onedrive",
            },
            client_id: provider.client_id.clone(),
            client_secret: SecretValue::new(&provider.client_secret),
            refresh_token: SecretValue::new(&provider.refresh_token),
            drive_id: provider.drive_id.clone(),
            team_drive: provider.team_drive.clone(),
            read_only: provider.read_only(),
            path: provider.path.clone(),
        }),
    };
    Ok(descriptor)
}

/// Wasabi has a well-known endpoint per region; everything else must be
/// configured explicitly or left to the backend default.
fn object_store_endpoint(provider: &Provider) -> String {
    if !provider.endpoint.is_empty() || provider.provider_type != ProviderType::Wasabi {
        return provider.endpoint.clone();
    }
    if provider.region.is_empty() {
        "s3.wasabisys.com".to_string()
    } else {
        format!("s3.{}.wasabisys.com", provider.region)
    }
}

impl RemoteDescriptor {
    pub fn is_local(&self) -> bool {
        matches!(self, RemoteDescriptor::Local(_))
    }

    /// Backend type name understood by the transfer engine.
    pub fn backend(&self) -> &'static str {
        match self {
            RemoteDescriptor::Local(_) => "local",
            RemoteDescriptor::Password(r) => r.backend,
            RemoteDescriptor::ObjectStore(r) => r.backend,
            RemoteDescriptor::CloudDrive(r) => r.backend,
        }
    }

    /// Skip TLS certificate checks during the probe.
    pub fn skip_cert_verify(&self) -> bool {
        match self {
            RemoteDescriptor::Password(r) => r.skip_cert_verify,
            RemoteDescriptor::ObjectStore(r) => r.skip_cert_verify,
            _ => false,
        }
    }

    /// Backend parameters for the remote definition. Empty values are left
    /// out so the engine applies its own defaults.
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = Vec::new();
        match self {
            RemoteDescriptor::Local(_) => {}
            RemoteDescriptor::Password(r) => {
                params.push(("host", r.host.clone()));
                params.push(("user", r.user.clone()));
                if let Some(port) = r.port {
                    params.push(("port", port.to_string()));
                }
                params.push(("pass", r.password.expose().to_string()));
                match r.backend {
                    "sftp" => params.push(("key_file", r.key_file.clone())),
                    "smb" => params.push(("domain", r.domain.clone())),
                    _ => {
                        if r.explicit_tls {
                            params.push(("explicit_tls", "true".to_string()));
                        }
                        if r.skip_cert_verify {
                            params.push(("no_check_certificate", "true".to_string()));
                        }
                    }
                }
            }
            RemoteDescriptor::ObjectStore(r) if r.backend == "b2" => {
                params.push(("account", r.access_key.clone()));
                params.push(("key", r.secret_key.expose().to_string()));
                params.push(("endpoint", r.endpoint.clone()));
            }
            RemoteDescriptor::ObjectStore(r) => {
                if let Some(vendor) = r.vendor {
                    params.push(("provider", vendor.to_string()));
                }
                params.push(("env_auth", "false".to_string()));
                params.push(("access_key_id", r.access_key.clone()));
                params.push(("secret_access_key", r.secret_key.expose().to_string()));
                params.push(("region", r.region.clone()));
                params.push(("endpoint", r.endpoint.clone()));
                params.push(("force_path_style", r.force_path_style.to_string()));
            }
            RemoteDescriptor::CloudDrive(r) => {
                params.push(("client_id", r.client_id.clone()));
                params.push(("client_secret", r.client_secret.expose().to_string()));
                if !r.refresh_token.is_empty() {
                    params.push(("token", oauth_token(r.refresh_token.expose())));
                }
                match r.backend {
                    "drive" => {
                        let scope = if r.read_only { "drive.readonly" } else { "drive" };
                        params.push(("scope", scope.to_string()));
                        params.push(("team_drive", r.team_drive.clone()));
                    }
                    "onedrive" => {
                        if r.team_drive.is_empty() {
                            params.push(("drive_id", r.drive_id.clone()));
                            params.push(("drive_type", "personal".to_string()));
                        } else {
                            let id = if r.drive_id.is_empty() {
                                &r.team_drive
                            } else {
                                &r.drive_id
                            };
                            params.push(("drive_id", id.clone()));
                            params.push(("drive_type", "documentLibrary".to_string()));
                        }
                    }
                    _ => params.push(("read_only", r.read_only.to_string())),
                }
            }
        }
        params.retain(|(_, value)| !value.is_empty());
        params
    }

    /// Listing target: the local path, or `<remote>:<path>` for everything
    /// else (object stores prefix the bucket).
    pub fn target(&self, remote_name: &str) -> String {
        match self {
            RemoteDescriptor::Local(r) => r.path.clone(),
            RemoteDescriptor::Password(r) => format!("{remote_name}:{}", r.path),
            RemoteDescriptor::ObjectStore(r) => {
                let path = r.path.trim_start_matches('/');
                match (r.bucket.is_empty(), path.is_empty()) {
                    (true, _) => format!("{remote_name}:{path}"),
                    (false, true) => format!("{remote_name}:{}", r.bucket),
                    (false, false) => format!("{remote_name}:{}/{path}", r.bucket),
                }
            }
            RemoteDescriptor::CloudDrive(r) => format!("{remote_name}:{}", r.path),
        }
    }
}

/// Token blob in the shape the engine stores for OAuth remotes. Only the
/// refresh token is known; the engine refreshes the access token itself.
fn oauth_token(refresh_token: &str) -> String {
    json!({
        "access_token": "",
        "token_type": "Bearer",
        "refresh_token": refresh_token,
        "expiry": "0001-01-01T00:00:00Z",
    })
    .to_string()
}
