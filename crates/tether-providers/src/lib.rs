use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{
    error::TetherError,
    providers::Provider,
    repository::ProviderRepository,
    storage::{RecordStore, StoreError},
};
use tether_storage::CredentialMiddleware;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

const PROVIDERS_KEY: &str = "providers";

/// Provider repository backed by a `RecordStore`, with credential pairs
/// sealed on write and opened on read.
pub struct StoredProviderRepo<S: RecordStore> {
    store: Arc<S>,
    middleware: Arc<CredentialMiddleware>,
    write_lock: Mutex<()>,
}

impl<S: RecordStore> StoredProviderRepo<S> {
    pub fn new(store: S, middleware: Arc<CredentialMiddleware>) -> Self {
        Self {
            store: Arc::new(store),
            middleware,
            write_lock: Mutex::new(()),
        }
    }

    pub fn middleware(&self) -> &Arc<CredentialMiddleware> {
        &self.middleware
    }

    async fn load(&self) -> Result<Vec<Provider>, TetherError> {
        match self.store.get(PROVIDERS_KEY).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(TetherError::storage),
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, providers: &[Provider]) -> Result<(), TetherError> {
        let bytes = serde_json::to_vec(providers).map_err(TetherError::storage)?;
        self.store
            .put(PROVIDERS_KEY, &bytes)
            .await
            .map_err(Into::into)
    }

    async fn find(&self, id: Uuid, owner: Option<Uuid>) -> Result<Provider, TetherError> {
        let mut provider = self
            .load()
            .await?
            .into_iter()
            .find(|p| p.id == id && owner.map_or(true, |user| p.user_id == user))
            .ok_or(TetherError::NotFound)?;
        self.middleware.after_fetch(&mut provider);
        Ok(provider)
    }
}

#[async_trait]
impl<S: RecordStore> ProviderRepository for StoredProviderRepo<S> {
    #[instrument(skip_all, fields(name = %provider.name, user_id = %provider.user_id))]
    async fn create(&self, mut provider: Provider) -> Result<Provider, TetherError> {
        provider.validate()?;
        if provider.id.is_nil() {
            provider.id = Uuid::new_v4();
        }
        let now = chrono::Utc::now();
        provider.created_at = now;
        provider.updated_at = now;
        self.middleware.before_save(&mut provider)?;

        let _guard = self.write_lock.lock().await;
        let mut providers = self.load().await?;
        if providers.iter().any(|p| p.id == provider.id) {
            return Err(TetherError::validation(format!(
                "provider {} already exists",
                provider.id
            )));
        }
        providers.push(provider.clone());
        self.save(&providers).await?;
        debug!(id = %provider.id, "provider created");
        Ok(provider)
    }

    #[instrument(skip_all, fields(id = %provider.id, user_id = %provider.user_id))]
    async fn update(&self, mut provider: Provider) -> Result<Provider, TetherError> {
        provider.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut providers = self.load().await?;
        let existing = providers
            .iter_mut()
            .find(|p| p.id == provider.id && p.user_id == provider.user_id)
            .ok_or(TetherError::NotFound)?;

        provider.created_at = existing.created_at;
        provider.updated_at = chrono::Utc::now();
        self.middleware.before_save(&mut provider)?;
        *existing = provider.clone();
        self.save(&providers).await?;
        Ok(provider)
    }

    #[instrument(skip(self))]
    async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Provider, TetherError> {
        self.find(id, Some(user_id)).await
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Provider>, TetherError> {
        let mut providers: Vec<Provider> = self
            .load()
            .await?
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect();
        self.middleware.after_fetch_all(&mut providers);
        Ok(providers)
    }

    #[instrument(skip(self))]
    async fn delete_for_user(&self, id: Uuid, user_id: Uuid) -> Result<(), TetherError> {
        let _guard = self.write_lock.lock().await;
        let mut providers = self.load().await?;
        let before = providers.len();
        providers.retain(|p| !(p.id == id && p.user_id == user_id));
        if providers.len() == before {
            return Err(TetherError::NotFound);
        }
        self.save(&providers).await
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Provider, TetherError> {
        self.find(id, None).await
    }
}
