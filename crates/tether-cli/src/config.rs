use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tether_verify::{
    verifier::{DEFAULT_PROBE_TIMEOUT, DEFAULT_REGISTER_TIMEOUT},
    RcloneEngine, VerifySettings,
};

/// User-level configuration loaded from `~/.config/tether/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Override for the record store root.
    pub data_dir: Option<PathBuf>,
    /// String encryption key; `TETHER_ENCRYPTION_KEY` takes precedence.
    pub encryption_key: Option<String>,
    pub key_source: KeySource,
    pub engine: EngineConfig,
}

/// Where the credential key comes from when no string key is configured.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    #[default]
    Config,
    Keyring,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Transfer-engine executable; `TETHER_RCLONE_PATH` takes precedence.
    pub binary: Option<PathBuf>,
    pub probe_timeout_secs: u64,
    pub register_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            register_timeout_secs: DEFAULT_REGISTER_TIMEOUT.as_secs(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> VerifySettings {
        VerifySettings {
            probe_timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
            register_timeout: Duration::from_secs(self.register_timeout_secs.max(1)),
        }
    }

    pub fn engine(&self) -> RcloneEngine {
        RcloneEngine::from_env(self.binary.clone())
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("tether").join("config.toml"))
}

/// Write `config` to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.engine.settings(), VerifySettings::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/tether-data"
            encryption_key = "correct horse battery staple"
            key_source = "keyring"
            [engine]
            binary = "/opt/rclone/rclone"
            probe_timeout_secs = 5
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/tether-data")),
                encryption_key: Some("correct horse battery staple".into()),
                key_source: KeySource::Keyring,
                engine: EngineConfig {
                    binary: Some(PathBuf::from("/opt/rclone/rclone")),
                    probe_timeout_secs: 5,
                    register_timeout_secs: 15,
                },
            }
        );
        assert_eq!(cfg.engine.settings().probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn engine_uses_configured_binary() {
        if std::env::var_os(tether_verify::engine::ENGINE_PATH_ENV).is_some() {
            return;
        }
        let engine = EngineConfig {
            binary: Some(PathBuf::from("/opt/rclone/rclone")),
            ..EngineConfig::default()
        }
        .engine();
        assert_eq!(engine.binary(), Path::new("/opt/rclone/rclone"));
    }

    #[test]
    fn rejects_unknown_key_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "key_source = \"vault\"\n").expect("write");
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/tether-data")),
            ..Config::default()
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config::default();
        let second = write_to_path_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);
        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
