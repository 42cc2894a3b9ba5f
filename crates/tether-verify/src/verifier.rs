use std::{sync::Arc, time::Duration};

use tempfile::TempDir;
use tether_core::{
    connection::ConnectionResult,
    error::TetherError,
    providers::Provider,
    repository::ProviderRepository,
};
use tether_storage::CredentialMiddleware;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    classifier::{classify, describe},
    engine::{EngineError, TransferEngine},
    shaper::shape,
};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REGISTER_TIMEOUT: Duration = Duration::from_secs(15);

const CONFIG_FILE_NAME: &str = "rclone.conf";
const WORKSPACE_PREFIX: &str = "tether-verify-";
/// Longest diagnostic excerpt kept in a result.
const MAX_DIAGNOSTIC_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySettings {
    /// Deadline for the listing probe.
    pub probe_timeout: Duration,
    /// Deadline for writing the remote definition.
    pub register_timeout: Duration,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            register_timeout: DEFAULT_REGISTER_TIMEOUT,
        }
    }
}

/// Proves that a stored provider can reach its remote.
pub struct ConnectionVerifier {
    repo: Arc<dyn ProviderRepository>,
    middleware: Arc<CredentialMiddleware>,
    engine: Arc<dyn TransferEngine>,
    settings: VerifySettings,
}

impl ConnectionVerifier {
    pub fn new(
        repo: Arc<dyn ProviderRepository>,
        middleware: Arc<CredentialMiddleware>,
        engine: Arc<dyn TransferEngine>,
        settings: VerifySettings,
    ) -> Self {
        Self {
            repo,
            middleware,
            engine,
            settings,
        }
    }

    /// Test a provider owned by `acting_user`. Records owned by anyone else
    /// are reported as [`TetherError::NotFound`], exactly like missing ones.
    #[instrument(skip(self))]
    pub async fn test_connection(
        &self,
        provider_id: Uuid,
        acting_user: Uuid,
    ) -> Result<ConnectionResult, TetherError> {
        let provider = self.repo.get_for_user(provider_id, acting_user).await?;
        self.test_provider(provider).await
    }

    /// [`test_connection`](Self::test_connection) for ids arriving as text.
    pub async fn test_connection_str(
        &self,
        provider_id: &str,
        acting_user: &str,
    ) -> Result<ConnectionResult, TetherError> {
        let provider_id = parse_id("provider id", provider_id)?;
        let acting_user = parse_id("user id", acting_user)?;
        self.test_connection(provider_id, acting_user).await
    }

    /// Test a record already in memory. Credentials are decrypted here even if
    /// the repository read already did so.
    #[instrument(skip_all, fields(provider_id = %provider.id, name = %provider.name, provider_type = %provider.provider_type))]
    pub async fn test_provider(
        &self,
        mut provider: Provider,
    ) -> Result<ConnectionResult, TetherError> {
        let unreadable = self.middleware.open(&mut provider);
        if unreadable > 0 {
            warn!(unreadable, "testing with credential fields that could not be decrypted");
        }

        let remote = shape(&provider)?;
        let workspace = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(TetherError::storage)?;

        let result = self.probe(&provider, &remote, &workspace).await;
        if let Err(err) = workspace.close() {
            warn!(error = %err, "failed to remove verification workspace");
        }

        match &result {
            Ok(outcome) => info!(
                provider_id = %provider.id,
                name = %provider.name,
                provider_type = %provider.provider_type,
                success = outcome.success,
                code = outcome.code().map(|c| c.as_str()).unwrap_or("NONE"),
                "connection test finished"
            ),
            Err(err) => warn!(
                provider_id = %provider.id,
                name = %provider.name,
                provider_type = %provider.provider_type,
                error = %err,
                "connection test aborted"
            ),
        }
        result
    }

    async fn probe(
        &self,
        provider: &Provider,
        remote: &crate::shaper::RemoteDescriptor,
        workspace: &TempDir,
    ) -> Result<ConnectionResult, TetherError> {
        let config = workspace.path().join(CONFIG_FILE_NAME);
        let remote_name = format!("tether-{}", provider.id.simple());

        if !remote.is_local() {
            self.engine
                .create_remote(&config, &remote_name, remote, self.settings.register_timeout)
                .await
                .map_err(|err| TetherError::RemoteRegistration(err.to_string()))?;
        }

        let target = remote.target(&remote_name);
        let outcome = self
            .engine
            .list(
                &config,
                &target,
                remote.skip_cert_verify(),
                self.settings.probe_timeout,
            )
            .await;

        Ok(match outcome {
            Ok(()) => ConnectionResult::succeeded(),
            Err(EngineError::Timeout(deadline)) => {
                ConnectionResult::timed_out(format!("no answer within {}s", deadline.as_secs()))
            }
            Err(EngineError::Failed { output, .. }) => {
                let code = classify(&output);
                ConnectionResult::failed(describe(code), code, excerpt(&output))
            }
            Err(err @ EngineError::Spawn(_)) => {
                let detail = err.to_string();
                let code = classify(&detail);
                ConnectionResult::failed(describe(code), code, detail)
            }
        })
    }
}

fn parse_id(what: &str, raw: &str) -> Result<Uuid, TetherError> {
    Uuid::parse_str(raw.trim())
        .map_err(|e| TetherError::validation(format!("invalid {what} `{raw}`: {e}")))
}

/// Trimmed diagnostic text, cut at a character boundary.
fn excerpt(output: &str) -> String {
    let trimmed = output.trim();
    match trimmed.char_indices().nth(MAX_DIAGNOSTIC_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use async_trait::async_trait;
    use tether_core::{
        connection::{ErrorCode, SUCCESS_MESSAGE},
        providers::ProviderType,
        storage::InMemoryRecordStore,
    };
    use tether_providers::StoredProviderRepo;
    use tether_storage::{key_provider::InMemoryKeyProvider, SecretCipher};
    use tokio::sync::Barrier;

    use super::*;
    use crate::shaper::RemoteDescriptor;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create {
            config: PathBuf,
            backend: &'static str,
            params: Vec<(&'static str, String)>,
        },
        List {
            config: PathBuf,
            target: String,
            workspace_existed: bool,
        },
    }

    enum ListBehavior {
        Succeed,
        Fail(&'static str),
        Timeout,
        Panic,
    }

    struct FakeEngine {
        calls: Mutex<Vec<Call>>,
        create_fails: bool,
        list: ListBehavior,
        /// Holds every listing until all parties have arrived.
        gate: Option<Arc<Barrier>>,
    }

    impl FakeEngine {
        fn new(list: ListBehavior) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                create_fails: false,
                list,
                gate: None,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn workspace(&self) -> PathBuf {
            let config = match self.calls().last().expect("engine was called") {
                Call::Create { config, .. } | Call::List { config, .. } => config.clone(),
            };
            config.parent().expect("workspace").to_path_buf()
        }
    }

    #[async_trait]
    impl TransferEngine for FakeEngine {
        async fn create_remote(
            &self,
            config: &Path,
            _name: &str,
            remote: &RemoteDescriptor,
            _deadline: Duration,
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(Call::Create {
                config: config.to_path_buf(),
                backend: remote.backend(),
                params: remote.parameters(),
            });
            if self.create_fails {
                return Err(EngineError::Failed {
                    exit_code: Some(1),
                    output: "unknown backend".into(),
                });
            }
            Ok(())
        }

        async fn list(
            &self,
            config: &Path,
            target: &str,
            _skip_cert_verify: bool,
            deadline: Duration,
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(Call::List {
                config: config.to_path_buf(),
                target: target.to_string(),
                workspace_existed: config.parent().map(Path::exists).unwrap_or(false),
            });
            if let Some(gate) = &self.gate {
                gate.wait().await;
            }
            match self.list {
                ListBehavior::Succeed => Ok(()),
                ListBehavior::Fail(text) => Err(EngineError::Failed {
                    exit_code: Some(1),
                    output: text.to_string(),
                }),
                ListBehavior::Timeout => Err(EngineError::Timeout(deadline)),
                ListBehavior::Panic => panic!("engine crashed"),
            }
        }
    }

    struct Harness {
        verifier: Arc<ConnectionVerifier>,
        repo: Arc<StoredProviderRepo<InMemoryRecordStore>>,
        engine: Arc<FakeEngine>,
    }

    fn harness(list: ListBehavior) -> Harness {
        harness_with(FakeEngine::new(list))
    }

    fn harness_with(engine: FakeEngine) -> Harness {
        let cipher = SecretCipher::from_provider(&InMemoryKeyProvider::default()).expect("cipher");
        let middleware = Arc::new(CredentialMiddleware::new(Arc::new(cipher)));
        let repo = Arc::new(StoredProviderRepo::new(
            InMemoryRecordStore::new(),
            middleware.clone(),
        ));
        let engine = Arc::new(engine);
        let verifier = Arc::new(ConnectionVerifier::new(
            repo.clone(),
            middleware,
            engine.clone(),
            VerifySettings::default(),
        ));
        Harness {
            verifier,
            repo,
            engine,
        }
    }

    async fn stored_sftp(h: &Harness, owner: Uuid) -> Provider {
        let mut provider = Provider::new(owner, "nas", ProviderType::Sftp);
        provider.host = "nas.local".into();
        provider.username = "backup".into();
        provider.password = "hunter2".into();
        provider.path = "backups".into();
        h.repo.create(provider).await.expect("create")
    }

    #[tokio::test]
    async fn successful_probe() {
        let h = harness(ListBehavior::Succeed);
        let owner = Uuid::new_v4();
        let provider = stored_sftp(&h, owner).await;

        let result = h
            .verifier
            .test_connection(provider.id, owner)
            .await
            .expect("test");
        assert!(result.success);
        assert_eq!(result.message, SUCCESS_MESSAGE);
        assert!(result.error.is_none());

        let calls = h.engine.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::Create {
                backend, params, ..
            } => {
                assert_eq!(*backend, "sftp");
                assert!(params.contains(&("pass", "hunter2".to_string())));
            }
            other => panic!("expected create first, got {other:?}"),
        }
        match &calls[1] {
            Call::List {
                target,
                workspace_existed,
                ..
            } => {
                assert_eq!(target, &format!("tether-{}:backups", provider.id.simple()));
                assert!(workspace_existed);
            }
            other => panic!("expected list second, got {other:?}"),
        }
        assert!(!h.engine.workspace().exists());
    }

    #[tokio::test]
    async fn other_users_cannot_test_or_enumerate() {
        let h = harness(ListBehavior::Succeed);
        let owner = Uuid::new_v4();
        let provider = stored_sftp(&h, owner).await;

        let err = h
            .verifier
            .test_connection(provider.id, Uuid::new_v4())
            .await
            .expect_err("not owner");
        assert_eq!(err, TetherError::NotFound);
        let err = h
            .verifier
            .test_connection(Uuid::new_v4(), owner)
            .await
            .expect_err("missing");
        assert_eq!(err, TetherError::NotFound);
        assert!(h.engine.calls().is_empty());

        assert!(h.verifier.test_connection(provider.id, owner).await.is_ok());
    }

    #[tokio::test]
    async fn classified_failures() {
        for (text, code) in [
            ("ssh: handshake failed: authentication failed", ErrorCode::Authentication),
            ("dial tcp 10.0.0.5:22: connect: connection refused", ErrorCode::Connection),
            ("error reading source root directory: directory not found", ErrorCode::ResourceNotFound),
        ] {
            let h = harness(ListBehavior::Fail(text));
            let owner = Uuid::new_v4();
            let provider = stored_sftp(&h, owner).await;
            let result = h.verifier.test_connection(provider.id, owner).await.expect("test");
            assert!(!result.success);
            assert_eq!(result.code(), Some(code), "{text}");
            assert_eq!(result.message, describe(code));
            assert_eq!(result.error.as_ref().map(|e| e.message.as_str()), Some(text));
            assert!(!h.engine.workspace().exists());
        }
    }

    #[tokio::test]
    async fn timeout_is_reported_as_result() {
        let h = harness(ListBehavior::Timeout);
        let owner = Uuid::new_v4();
        let provider = stored_sftp(&h, owner).await;
        let result = h.verifier.test_connection(provider.id, owner).await.expect("test");
        assert!(!result.success);
        assert_eq!(result.code(), Some(ErrorCode::Timeout));
        assert!(result.message.contains("timed out"));
        assert!(!h.engine.workspace().exists());
    }

    #[tokio::test]
    async fn registration_failure_is_terminal() {
        let mut engine = FakeEngine::new(ListBehavior::Succeed);
        engine.create_fails = true;
        let h = harness_with(engine);
        let owner = Uuid::new_v4();
        let provider = stored_sftp(&h, owner).await;

        let err = h
            .verifier
            .test_connection(provider.id, owner)
            .await
            .expect_err("registration fails");
        assert!(matches!(err, TetherError::RemoteRegistration(_)));
        assert!(err.to_string().contains("failed to create remote definition"));
        let calls = h.engine.calls();
        assert_eq!(calls.len(), 1, "listing must not run");
        assert!(!h.engine.workspace().exists());
    }

    #[tokio::test]
    async fn local_provider_skips_registration() {
        let h = harness(ListBehavior::Succeed);
        let owner = Uuid::new_v4();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut provider = Provider::new(owner, "disk", ProviderType::Local);
        provider.path = dir.path().display().to_string();
        let provider = h.repo.create(provider).await.expect("create");

        let result = h.verifier.test_connection(provider.id, owner).await.expect("test");
        assert!(result.success);
        let calls = h.engine.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::List { target, .. } => assert_eq!(target, &dir.path().display().to_string()),
            other => panic!("expected only a listing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_tests_use_separate_workspaces() {
        let mut engine = FakeEngine::new(ListBehavior::Succeed);
        engine.gate = Some(Arc::new(Barrier::new(2)));
        let h = harness_with(engine);
        let owner = Uuid::new_v4();
        let first = stored_sftp(&h, owner).await;
        let second = stored_sftp(&h, owner).await;

        let (a, b) = tokio::join!(
            h.verifier.test_connection(first.id, owner),
            h.verifier.test_connection(second.id, owner),
        );
        assert!(a.expect("first").success);
        assert!(b.expect("second").success);

        let listings: Vec<(PathBuf, bool)> = h
            .engine
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::List {
                    config,
                    workspace_existed,
                    ..
                } => Some((config, workspace_existed)),
                Call::Create { .. } => None,
            })
            .collect();
        assert_eq!(listings.len(), 2);
        assert_ne!(listings[0].0, listings[1].0);
        assert_ne!(listings[0].0.parent(), listings[1].0.parent());
        for (config, existed) in &listings {
            assert!(existed);
            assert!(!config.parent().expect("workspace").exists());
        }
    }

    #[tokio::test]
    async fn workspace_removed_when_engine_panics() {
        let h = harness(ListBehavior::Panic);
        let owner = Uuid::new_v4();
        let provider = stored_sftp(&h, owner).await;

        let verifier = h.verifier.clone();
        let joined = tokio::spawn(async move { verifier.test_connection(provider.id, owner).await }).await;
        assert!(joined.is_err(), "panic should propagate");
        assert!(!h.engine.workspace().exists());
    }

    #[tokio::test]
    async fn in_memory_records_are_decrypted_before_shaping() {
        let h = harness(ListBehavior::Succeed);
        let owner = Uuid::new_v4();
        let mut provider = Provider::new(owner, "bucket", ProviderType::S3);
        provider.access_key = "AKIA123".into();
        provider.secret_key = "MyS3Secret!23".into();
        h.repo.middleware().seal(&mut provider).expect("seal");
        assert!(provider.secret_key.is_empty());

        let result = h.verifier.test_provider(provider).await.expect("test");
        assert!(result.success);
        match &h.engine.calls()[0] {
            Call::Create { params, .. } => {
                assert!(params.contains(&("secret_access_key", "MyS3Secret!23".to_string())));
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_types_are_unsupported() {
        let h = harness(ListBehavior::Succeed);
        let provider = Provider::new(Uuid::new_v4(), "future", ProviderType::Unknown);
        let err = h.verifier.test_provider(provider).await.expect_err("unsupported");
        assert_eq!(err, TetherError::UnsupportedProvider(ProviderType::Unknown));
        assert!(h.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn textual_ids_are_validated() {
        let h = harness(ListBehavior::Succeed);
        let err = h
            .verifier
            .test_connection_str("not-a-uuid", &Uuid::new_v4().to_string())
            .await
            .expect_err("invalid id");
        assert!(matches!(err, TetherError::Validation(_)));
    }

    #[test]
    fn excerpt_trims_and_caps() {
        assert_eq!(excerpt("  boom \n"), "boom");
        let long = "é".repeat(MAX_DIAGNOSTIC_CHARS + 10);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_DIAGNOSTIC_CHARS + 3);
    }
}
