//! Persistent identity abstraction.
//!
//! The reader's durable state is one small record: its backend-assigned id,
//! the bearer token, and the authorization flag. It is read once at boot and
//! written on registration and on deauthorization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Token value of a reader that has never been issued one.
pub const UNSET_API_KEY: &str = "0000000000000000";

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The persisted reader identity.
///
/// `has_auth` is a gate independent of token presence: deauthorization
/// clears the flag but deliberately leaves the stored id and token in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderIdentity {
    /// Backend-assigned reader id; 0 means unset.
    pub reader_id: u32,
    /// Opaque bearer token.
    pub api_key: String,
    /// Whether the backend has authorized this reader.
    pub has_auth: bool,
}

impl Default for ReaderIdentity {
    fn default() -> Self {
        Self {
            reader_id: 0,
            api_key: UNSET_API_KEY.to_string(),
            has_auth: false,
        }
    }
}

impl ReaderIdentity {
    /// A reader counts as registered only with both a nonzero id and the
    /// stored authorization flag.
    pub fn is_registered(&self) -> bool {
        self.reader_id != 0 && self.has_auth
    }
}

/// Storage abstraction for the reader identity.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load the persisted identity, or the default identity if none has been
    /// persisted yet.
    async fn load_identity(&self) -> Result<ReaderIdentity, StoreError>;

    /// Persist the identity.
    async fn save_identity(&self, identity: &ReaderIdentity) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral use.
#[derive(Default)]
pub struct InMemoryStore {
    identity: RwLock<ReaderIdentity>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: ReaderIdentity) -> Self {
        Self {
            identity: RwLock::new(identity),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load_identity(&self) -> Result<ReaderIdentity, StoreError> {
        Ok(self.identity.read().await.clone())
    }

    async fn save_identity(&self, identity: &ReaderIdentity) -> Result<(), StoreError> {
        *self.identity.write().await = identity.clone();
        Ok(())
    }
}
