//! JSON file identity store.
//!
//! The persisted record is three fields, so a single pretty-printed JSON
//! file is plenty. A missing file reads as the default (unregistered)
//! identity, which is exactly the fresh-boot state.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::store::{ReaderIdentity, Store, StoreError};

/// File-backed [`Store`].
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl Store for FileStore {
    async fn load_identity(&self) -> Result<ReaderIdentity, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no identity file, starting unregistered");
                Ok(ReaderIdentity::default())
            }
            Err(e) => Err(StoreError::OperationFailed(e.to_string())),
        }
    }

    async fn save_identity(&self, identity: &ReaderIdentity) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(identity)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| StoreError::OperationFailed(e.to_string()))
    }
}
