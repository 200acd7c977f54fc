use thiserror::Error;

/// Top-level error type for the Bazaar system.
///
/// Storage and configuration code returns this type directly. Higher layers
/// (chat, llm, api) define their own error enums and convert from this one
/// so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BazaarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Conversation already ended: {0}")]
    ConversationEnded(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for BazaarError {
    fn from(err: toml::de::Error) -> Self {
        BazaarError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BazaarError {
    fn from(err: toml::ser::Error) -> Self {
        BazaarError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BazaarError {
    fn from(err: serde_json::Error) -> Self {
        BazaarError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Bazaar operations.
pub type Result<T> = std::result::Result<T, BazaarError>;
