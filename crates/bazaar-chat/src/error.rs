//! Error types for the chat pipeline.

use bazaar_core::error::BazaarError;
use bazaar_llm::LlmError;

/// Errors from the chat pipeline.
///
/// Only [`ChatError::InvalidInput`] and [`ChatError::Disabled`] ever reach the
/// caller of a turn; everything else is turned into a conversational reply by
/// the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("conversation already ended: {0}")]
    ConversationEnded(String),
    #[error("classifier contract violation: {0}")]
    ClassifierContractViolation(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("scope violation: {0}")]
    ScopeViolation(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl From<BazaarError> for ChatError {
    fn from(err: BazaarError) -> Self {
        match err {
            BazaarError::NotFound(what) => ChatError::ConversationNotFound(what),
            BazaarError::ConversationEnded(id) => ChatError::ConversationEnded(id),
            BazaarError::InvalidQuery(msg) => ChatError::UnsupportedOperation(msg),
            other => ChatError::StorageFailure(other.to_string()),
        }
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MalformedResponse(msg) => ChatError::ClassifierContractViolation(msg),
            other => ChatError::Generation(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChatError::StorageFailure(format!("storage task failed: {}", err))
    }
}
