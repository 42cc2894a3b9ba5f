//! The external transfer engine, reached only through its command line.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::{
    process::{run_with_deadline, ProcessError},
    shaper::RemoteDescriptor,
};

/// Environment variable overriding the engine executable.
pub const ENGINE_PATH_ENV: &str = "TETHER_RCLONE_PATH";
pub const DEFAULT_ENGINE_BINARY: &str = "rclone";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not run transfer engine: {0}")]
    Spawn(String),
    #[error("transfer engine did not finish within {0:?}")]
    Timeout(Duration),
    #[error("transfer engine exited unsuccessfully (status {exit_code:?}): {output}")]
    Failed {
        exit_code: Option<i32>,
        output: String,
    },
}

impl From<ProcessError> for EngineError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { deadline } => EngineError::Timeout(deadline),
            other => EngineError::Spawn(other.to_string()),
        }
    }
}

/// The two operations a connection test needs from the engine.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Phase A: write a named remote definition into the private `config` file.
    async fn create_remote(
        &self,
        config: &Path,
        name: &str,
        remote: &RemoteDescriptor,
        deadline: Duration,
    ) -> Result<(), EngineError>;

    /// Phase B: one listing attempt against `target`.
    async fn list(
        &self,
        config: &Path,
        target: &str,
        skip_cert_verify: bool,
        deadline: Duration,
    ) -> Result<(), EngineError>;
}

/// `rclone` invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct RcloneEngine {
    binary: PathBuf,
}

impl RcloneEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Binary from `TETHER_RCLONE_PATH`, then `configured`, then `rclone` on `PATH`.
    pub fn from_env(configured: Option<PathBuf>) -> Self {
        let binary = std::env::var_os(ENGINE_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or(configured)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE_BINARY));
        Self::new(binary)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, args: Vec<String>, deadline: Duration) -> Result<(), EngineError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args);
        let output = run_with_deadline(&mut cmd, deadline).await?;
        debug!(
            exit_code = ?output.exit_code,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "transfer engine finished"
        );
        if output.success {
            Ok(())
        } else {
            Err(EngineError::Failed {
                exit_code: output.exit_code,
                output: output.combined,
            })
        }
    }
}

#[async_trait]
impl TransferEngine for RcloneEngine {
    #[instrument(skip_all, fields(remote = %name, backend = remote.backend()))]
    async fn create_remote(
        &self,
        config: &Path,
        name: &str,
        remote: &RemoteDescriptor,
        deadline: Duration,
    ) -> Result<(), EngineError> {
        self.run(create_remote_args(config, name, remote), deadline)
            .await
    }

    #[instrument(skip_all, fields(target = %target))]
    async fn list(
        &self,
        config: &Path,
        target: &str,
        skip_cert_verify: bool,
        deadline: Duration,
    ) -> Result<(), EngineError> {
        self.run(list_args(config, target, skip_cert_verify), deadline)
            .await
    }
}

/// `config create <name> <backend> key=value ... --obscure --non-interactive`.
/// `--obscure` makes the engine obscure password-type values itself.
pub fn create_remote_args(config: &Path, name: &str, remote: &RemoteDescriptor) -> Vec<String> {
    let mut args = vec![
        "config".to_string(),
        "create".to_string(),
        name.to_string(),
        remote.backend().to_string(),
    ];
    args.extend(
        remote
            .parameters()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}")),
    );
    args.extend([
        "--obscure".to_string(),
        "--non-interactive".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ]);
    args
}

/// A single shallow listing with retries disabled. The target follows `--`
/// so it is never parsed as a flag.
pub fn list_args(config: &Path, target: &str, skip_cert_verify: bool) -> Vec<String> {
    let mut args = vec![
        "lsf".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--max-depth".to_string(),
        "1".to_string(),
        "--retries".to_string(),
        "1".to_string(),
        "--low-level-retries".to_string(),
        "1".to_string(),
    ];
    if skip_cert_verify {
        args.push("--no-check-certificate".to_string());
    }
    args.extend(["--".to_string(), target.to_string()]);
    args
}
