use domain::DomainError;
use entity_store::StoreError;
use thiserror::Error;

/// Errors that can occur while driving a conversation.
///
/// Invalid merchant input is not an error: it re-prompts the current
/// step. These are infrastructure failures.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("conversation for {owner} kept conflicting with concurrent updates")]
    ConflictRetriesExhausted { owner: String },
}
