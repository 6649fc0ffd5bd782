use crate::error::StorageError;
use crate::model::entity::TokenRecord;

/// Persistent token records, at most one per system.
#[async_trait::async_trait]
pub trait TokenRepository: Send + Sync {
    async fn load(&self, system_id: &str) -> Result<Option<TokenRecord>, StorageError>;
    /// Replaces any record stored for the same system.
    async fn save(&self, record: &TokenRecord) -> Result<(), StorageError>;
    /// Clears one system, or every system with `None`. Clearing nothing is not an error.
    async fn clear(&self, system_id: Option<&str>) -> Result<(), StorageError>;
}
