use std::{fmt, path::Path, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    credentials::{CredentialKind, CredentialPair, CredentialRecord},
    error::TetherError,
};

/// Remote storage type of a provider record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Local,
    Sftp,
    Ftp,
    Smb,
    S3,
    Wasabi,
    Minio,
    B2,
    #[serde(rename = "onedrive")]
    OneDrive,
    GoogleDrive,
    GooglePhotos,
    /// A type written by a newer build that this one does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// How a provider authenticates, which decides the credential fields it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    Local,
    /// Host + user + password or key file.
    Password,
    /// Access key + secret key.
    ObjectStore,
    /// OAuth client + refresh token.
    CloudDrive,
}

impl ProviderType {
    pub const KNOWN: [ProviderType; 11] = [
        ProviderType::Local,
        ProviderType::Sftp,
        ProviderType::Ftp,
        ProviderType::Smb,
        ProviderType::S3,
        ProviderType::Wasabi,
        ProviderType::Minio,
        ProviderType::B2,
        ProviderType::OneDrive,
        ProviderType::GoogleDrive,
        ProviderType::GooglePhotos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Local => "local",
            ProviderType::Sftp => "sftp",
            ProviderType::Ftp => "ftp",
            ProviderType::Smb => "smb",
            ProviderType::S3 => "s3",
            ProviderType::Wasabi => "wasabi",
            ProviderType::Minio => "minio",
            ProviderType::B2 => "b2",
            ProviderType::OneDrive => "onedrive",
            ProviderType::GoogleDrive => "google_drive",
            ProviderType::GooglePhotos => "google_photos",
            ProviderType::Unknown => "unknown",
        }
    }

    /// `None` for types this build cannot talk to.
    pub fn family(&self) -> Option<ProtocolFamily> {
        match self {
            ProviderType::Local => Some(ProtocolFamily::Local),
            ProviderType::Sftp | ProviderType::Ftp | ProviderType::Smb => {
                Some(ProtocolFamily::Password)
            }
            ProviderType::S3 | ProviderType::Wasabi | ProviderType::Minio | ProviderType::B2 => {
                Some(ProtocolFamily::ObjectStore)
            }
            ProviderType::OneDrive | ProviderType::GoogleDrive | ProviderType::GooglePhotos => {
                Some(ProtocolFamily::CloudDrive)
            }
            ProviderType::Unknown => None,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderType::KNOWN
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| TetherError::validation(format!("unknown provider type: {s}")))
    }
}

/// A stored set of connection attributes and credentials for one remote.
///
/// Plaintext credential fields are transient: they are skipped by serde and
/// only ever populated in memory. Their `encrypted_*` partners are what
/// reaches storage.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    /// Directory probed by connection tests (local path or remote sub-path).
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub key_file: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub drive_id: String,
    #[serde(default)]
    pub team_drive: String,

    // Tri-state flags: `None` means "use the policy default for this type".
    #[serde(default)]
    pub explicit_tls: Option<bool>,
    #[serde(default)]
    pub force_path_style: Option<bool>,
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default)]
    pub skip_cert_verify: Option<bool>,

    #[serde(skip)]
    pub password: String,
    #[serde(default)]
    pub encrypted_password: String,
    #[serde(skip)]
    pub secret_key: String,
    #[serde(default)]
    pub encrypted_secret_key: String,
    #[serde(skip)]
    pub client_secret: String,
    #[serde(default)]
    pub encrypted_client_secret: String,
    #[serde(skip)]
    pub refresh_token: String,
    #[serde(default)]
    pub encrypted_refresh_token: String,
}

impl Provider {
    pub fn new(user_id: Uuid, name: impl Into<String>, provider_type: ProviderType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            user_id,
            provider_type,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    pub fn family(&self) -> Option<ProtocolFamily> {
        self.provider_type.family()
    }

    pub fn explicit_tls(&self) -> bool {
        self.explicit_tls.unwrap_or(false)
    }

    /// Minio needs path-style addressing unless told otherwise.
    pub fn force_path_style(&self) -> bool {
        self.force_path_style
            .unwrap_or(self.provider_type == ProviderType::Minio)
    }

    pub fn read_only(&self) -> bool {
        self.read_only.unwrap_or(false)
    }

    pub fn skip_cert_verify(&self) -> bool {
        self.skip_cert_verify.unwrap_or(false)
    }

    /// Checks run before a record is created or updated.
    pub fn validate(&self) -> Result<(), TetherError> {
        if self.name.trim().is_empty() {
            return Err(TetherError::validation("provider name must not be empty"));
        }
        if self.port == Some(0) {
            return Err(TetherError::validation("port must be between 1 and 65535"));
        }
        match self.family() {
            None => Err(TetherError::validation(format!(
                "unknown provider type: {}",
                self.provider_type
            ))),
            Some(ProtocolFamily::Local) => check_local_path(&self.path),
            Some(ProtocolFamily::Password) if self.host.trim().is_empty() => Err(
                TetherError::validation(format!("{} providers need a host", self.provider_type)),
            ),
            Some(ProtocolFamily::ObjectStore) if self.access_key.trim().is_empty() => {
                Err(TetherError::validation(format!(
                    "{} providers need an access key",
                    self.provider_type
                )))
            }
            _ => Ok(()),
        }
    }
}

impl CredentialRecord for Provider {
    fn credential_pairs(&mut self) -> Vec<CredentialPair<'_>> {
        vec![
            CredentialPair {
                name: "password",
                kind: CredentialKind::Password,
                plaintext: &mut self.password,
                ciphertext: &mut self.encrypted_password,
                transient: true,
            },
            CredentialPair {
                name: "secret_key",
                kind: CredentialKind::SecretKey,
                plaintext: &mut self.secret_key,
                ciphertext: &mut self.encrypted_secret_key,
                transient: true,
            },
            CredentialPair {
                name: "client_secret",
                kind: CredentialKind::ClientSecret,
                plaintext: &mut self.client_secret,
                ciphertext: &mut self.encrypted_client_secret,
                transient: true,
            },
            CredentialPair {
                name: "refresh_token",
                kind: CredentialKind::RefreshToken,
                plaintext: &mut self.refresh_token,
                ciphertext: &mut self.encrypted_refresh_token,
                transient: true,
            },
        ]
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("user_id", &self.user_id)
            .field("type", &self.provider_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("path", &self.path)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("password", &redacted(&self.password))
            .field("secret_key", &redacted(&self.secret_key))
            .field("client_secret", &redacted(&self.client_secret))
            .field("refresh_token", &redacted(&self.refresh_token))
            .finish_non_exhaustive()
    }
}

/// A local provider path must be absolute. It is handed to the transfer
/// engine as-is, so anything shaped like a flag (`-`) or an inline remote
/// (`:backend:`) is refused.
pub fn check_local_path(path: &str) -> Result<(), TetherError> {
    if path.trim().is_empty() {
        return Err(TetherError::validation("local providers need a path"));
    }
    if path.starts_with('-') || path.starts_with(':') || !Path::new(path).is_absolute() {
        return Err(TetherError::validation(format!(
            "local path `{path}` must be an absolute directory path"
        )));
    }
    Ok(())
}

/// Placeholder shown instead of a secret value.
pub fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
