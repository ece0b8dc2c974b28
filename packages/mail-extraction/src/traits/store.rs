//! Message store trait.
//!
//! The store is an external service (a mailbox API, an export on disk, ...).
//! The agent only ever searches it and fetches bodies by id; everything
//! else, authentication included, is the implementation's business.

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::types::message::{MessageContent, MessagePreview};

/// Searchable message store.
///
/// # Implementations
///
/// - `MemoryMailbox` - in-memory store, loadable from a JSON export
/// - `MockMailbox` - call-tracking wrapper with failure injection for tests
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Search for messages matching `query`.
    ///
    /// Returns a bounded number of previews (no bodies).
    async fn search(&self, query: &str) -> StoreResult<Vec<MessagePreview>>;

    /// Fetch full messages by id.
    ///
    /// Must fail with a typed error rather than silently return a partial
    /// result.
    async fn fetch(&self, ids: &[String]) -> StoreResult<Vec<MessageContent>>;

    /// Fetch a single message.
    async fn fetch_one(&self, id: &str) -> StoreResult<MessageContent> {
        self.fetch(&[id.to_string()])
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::MessageNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for std::sync::Arc<T> {
    async fn search(&self, query: &str) -> StoreResult<Vec<MessagePreview>> {
        (**self).search(query).await
    }

    async fn fetch(&self, ids: &[String]) -> StoreResult<Vec<MessageContent>> {
        (**self).fetch(ids).await
    }
}
