pub mod conversation_repository;
pub mod document;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::Conversation;

/// Opaque revision marker of a stored conversation (the store's update time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision(pub String);

/// A conversation as read from the store, with the revision it was read at
/// when the store reports one.
#[derive(Debug, Clone)]
pub struct StoredConversation {
    pub conversation: Conversation,
    pub revision: Option<Revision>,
}

/// Precondition attached to a conversation rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Last write wins.
    Overwrite,
    /// Fails with [`StoreError::Conflict`] if the document exists.
    MustNotExist,
    /// Fails with [`StoreError::Conflict`] unless the document is still at this revision.
    MatchesRevision(Revision),
}

/// Document store holding one document per conversation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// `Ok(None)` when no document exists yet.
    async fn get(&self, conversation_id: &str) -> Result<Option<StoredConversation>, StoreError>;

    /// Replaces the whole document and stamps `lastUpdated` with the store's time.
    async fn put(
        &self,
        conversation: &Conversation,
        condition: WriteCondition,
    ) -> Result<(), StoreError>;
}

/// Rejects ids that cannot name a single document in the collection.
pub fn validate_conversation_id(id: &str) -> Result<(), StoreError> {
    let reserved = id.len() > 4 && id.starts_with("__") && id.ends_with("__");
    if id.is_empty() || id.contains('/') || id == "." || id == ".." || reserved || id.len() > 1500 {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}
