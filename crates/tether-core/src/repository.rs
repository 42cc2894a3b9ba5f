use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::TetherError, providers::Provider};

/// Persistence contract for provider records.
///
/// Implementations encrypt credential pairs on every write and decrypt them
/// on every read. Lookups scoped by user return [`TetherError::NotFound`] for
/// records owned by someone else.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Store a new record. The returned copy has its transient plaintext
    /// fields cleared.
    async fn create(&self, provider: Provider) -> Result<Provider, TetherError>;

    /// Replace an existing record owned by `provider.user_id`.
    async fn update(&self, provider: Provider) -> Result<Provider, TetherError>;

    /// Fetch a record owned by `user_id`, with credentials decrypted.
    async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Provider, TetherError>;

    /// All records owned by `user_id`, with credentials decrypted.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Provider>, TetherError>;

    async fn delete_for_user(&self, id: Uuid, user_id: Uuid) -> Result<(), TetherError>;

    /// Unscoped lookup for privileged callers (schedulers, administrators).
    async fn get(&self, id: Uuid) -> Result<Provider, TetherError>;
}
