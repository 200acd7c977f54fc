use thiserror::Error;

/// Errors from the text-generation transport.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured: {0}")]
    NotConfigured(String),

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response malformed: {0}")]
    MalformedResponse(String),

    #[error("Scripted generator exhausted")]
    Exhausted,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::MalformedResponse(err.to_string())
    }
}
