//! Credential pairs: a transient plaintext field next to its persisted
//! ciphertext field, and the capability records use to expose them.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Prefix naming the ciphertext half of a credential pair (`encrypted_password`
/// pairs with `password`).
pub const ENCRYPTED_PREFIX: &str = "encrypted_";

/// Substrings that make a field name credential-like for the convention scan.
const CREDENTIAL_MARKERS: [&str; 4] = ["password", "secret", "token", "key"];

/// What a secret is. Bound into the ciphertext so a value encrypted as one
/// kind cannot be decrypted as another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Password,
    SecretKey,
    ClientSecret,
    RefreshToken,
    Token,
    Generic,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 6] = [
        CredentialKind::Password,
        CredentialKind::SecretKey,
        CredentialKind::ClientSecret,
        CredentialKind::RefreshToken,
        CredentialKind::Token,
        CredentialKind::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Password => "password",
            CredentialKind::SecretKey => "secret_key",
            CredentialKind::ClientSecret => "client_secret",
            CredentialKind::RefreshToken => "refresh_token",
            CredentialKind::Token => "token",
            CredentialKind::Generic => "generic",
        }
    }

    /// Best guess from a field name, used by the convention scan.
    pub fn from_field_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if let Ok(kind) = name.parse() {
            return kind;
        }
        if name.contains("password") {
            CredentialKind::Password
        } else if name.contains("refresh") {
            CredentialKind::RefreshToken
        } else if name.contains("token") {
            CredentialKind::Token
        } else if name.contains("client") && name.contains("secret") {
            CredentialKind::ClientSecret
        } else if name.contains("secret") || name.contains("key") {
            CredentialKind::SecretKey
        } else {
            CredentialKind::Generic
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown credential kind: {s}"))
    }
}

/// A named string field of a record, offered to the convention scan.
pub struct FieldSlot<'a> {
    pub name: &'static str,
    pub value: &'a mut String,
    /// `true` when the field is never written to storage.
    pub transient: bool,
}

impl<'a> FieldSlot<'a> {
    pub fn new(name: &'static str, value: &'a mut String, transient: bool) -> Self {
        Self {
            name,
            value,
            transient,
        }
    }
}

/// One secret: the in-process plaintext and its persisted ciphertext.
pub struct CredentialPair<'a> {
    pub name: &'static str,
    pub kind: CredentialKind,
    pub plaintext: &'a mut String,
    pub ciphertext: &'a mut String,
    /// Clear `plaintext` after a successful encryption.
    pub transient: bool,
}

/// Capability implemented by every record that carries credential pairs.
///
/// Types with simple pairs only list their string fields in [`field_slots`]
/// and let the naming convention pair them up. Types with several
/// heterogeneous pairs override [`credential_pairs`] instead.
///
/// [`field_slots`]: CredentialRecord::field_slots
/// [`credential_pairs`]: CredentialRecord::credential_pairs
pub trait CredentialRecord {
    /// String fields visible to the convention scan.
    fn field_slots(&mut self) -> Vec<FieldSlot<'_>> {
        Vec::new()
    }

    /// Sensitive field pairs with their current values.
    fn credential_pairs(&mut self) -> Vec<CredentialPair<'_>> {
        pairs_by_convention(self.field_slots())
    }
}

/// Whether a field name looks like it holds a secret.
pub fn is_credential_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.starts_with(ENCRYPTED_PREFIX) && CREDENTIAL_MARKERS.iter().any(|m| lower.contains(m))
}

/// Pair `<name>` with `encrypted_<name>` for every credential-like name.
/// Credential-like fields without a ciphertext partner are ignored.
pub fn pairs_by_convention(slots: Vec<FieldSlot<'_>>) -> Vec<CredentialPair<'_>> {
    let mut encrypted: HashMap<&'static str, FieldSlot<'_>> = HashMap::new();
    let mut candidates = Vec::new();
    for slot in slots {
        if let Some(base) = slot.name.strip_prefix(ENCRYPTED_PREFIX) {
            encrypted.insert(base, slot);
        } else if is_credential_name(slot.name) {
            candidates.push(slot);
        }
    }

    candidates
        .into_iter()
        .filter_map(|plain| {
            let cipher = encrypted.remove(plain.name)?;
            Some(CredentialPair {
                name: plain.name,
                kind: CredentialKind::from_field_name(plain.name),
                plaintext: plain.value,
                ciphertext: cipher.value,
                transient: plain.transient,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MailSettings {
        host: String,
        smtp_password: String,
        encrypted_smtp_password: String,
        api_token: String,
    }

    impl CredentialRecord for MailSettings {
        fn field_slots(&mut self) -> Vec<FieldSlot<'_>> {
            vec![
                FieldSlot::new("host", &mut self.host, false),
                FieldSlot::new("smtp_password", &mut self.smtp_password, true),
                FieldSlot::new(
                    "encrypted_smtp_password",
                    &mut self.encrypted_smtp_password,
                    false,
                ),
                FieldSlot::new("api_token", &mut self.api_token, false),
            ]
        }
    }

    #[test]
    fn convention_pairs_only_fields_with_encrypted_partner() {
        let mut settings = MailSettings {
            smtp_password: "pw".into(),
            api_token: "tok".into(),
            ..Default::default()
        };
        let pairs = settings.credential_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "smtp_password");
        assert_eq!(pairs[0].kind, CredentialKind::Password);
        assert!(pairs[0].transient);
        assert_eq!(pairs[0].plaintext.as_str(), "pw");
    }

    #[test]
    fn credential_names() {
        assert!(is_credential_name("password"));
        assert!(is_credential_name("client_secret"));
        assert!(is_credential_name("RefreshToken"));
        assert!(!is_credential_name("encrypted_password"));
        assert!(!is_credential_name("host"));
    }

    #[test]
    fn kind_from_field_name() {
        assert_eq!(
            CredentialKind::from_field_name("client_secret"),
            CredentialKind::ClientSecret
        );
        assert_eq!(
            CredentialKind::from_field_name("oauth_refresh_token"),
            CredentialKind::RefreshToken
        );
        assert_eq!(
            CredentialKind::from_field_name("access_secret"),
            CredentialKind::SecretKey
        );
        assert_eq!("token".parse::<CredentialKind>(), Ok(CredentialKind::Token));
    }
}
