use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::TetherError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no record stored under `{key}`")]
    NotFound { key: String },
    #[error("record store failure: {reason}")]
    Storage { reason: String },
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(err: PoisonError<T>) -> Self {
        StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        }
    }
}

impl From<StoreError> for TetherError {
    fn from(err: StoreError) -> Self {
        TetherError::storage(err)
    }
}

/// Byte persistence underneath the repositories.
///
/// A key holds one serialized document, usually a whole collection (all
/// provider records live under a single key), and every `put` replaces that
/// document. Credential values are already sealed when they arrive here.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Replace the document stored under `key`.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Fetch the document stored under `key`, or [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove the document under `key`; removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct Document {
    bytes: Vec<u8>,
    revision: u64,
}

/// Process-local store. Clones share the same documents.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    documents: Arc<RwLock<HashMap<String, Document>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes exactly as stored.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let documents = self.documents.read().ok()?;
        documents.get(key).map(|doc| doc.bytes.clone())
    }

    /// Number of writes the document under `key` has seen; 0 when it was
    /// never written or has been deleted.
    pub fn revision(&self, key: &str) -> u64 {
        self.documents
            .read()
            .ok()
            .and_then(|documents| documents.get(key).map(|doc| doc.revision))
            .unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut documents = self.documents.write()?;
        let revision = documents.get(key).map_or(0, |doc| doc.revision) + 1;
        documents.insert(
            key.to_string(),
            Document {
                bytes: value.to_vec(),
                revision,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.documents
            .read()?
            .get(key)
            .map(|doc| doc.bytes.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.documents.write()?.remove(key);
        Ok(())
    }
}
