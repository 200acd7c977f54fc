//! Bazaar LLM crate - structured text generation.
//!
//! Every call to the language model asks for a JSON document conforming to a
//! named JSON schema. [`TextGenerator`] is the seam the chat pipeline depends
//! on; [`ChatCompletionsClient`] talks to an OpenAI-compatible endpoint and
//! [`ScriptedGenerator`] replays canned responses in tests.

pub mod client;
pub mod error;
pub mod scripted;

use async_trait::async_trait;
use serde_json::Value;

pub use client::ChatCompletionsClient;
pub use error::LlmError;
pub use scripted::ScriptedGenerator;

/// A single schema-constrained generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    /// Schema name reported to the provider (e.g. `initial_response`).
    pub schema_name: String,
    /// JSON schema the response must conform to.
    pub schema: Value,
    /// System instructions.
    pub system: String,
    /// User-turn content.
    pub user: String,
}

impl StructuredRequest {
    pub fn new(schema_name: &str, schema: Value, system: String, user: String) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            schema,
            system,
            user,
        }
    }
}

/// Source of schema-constrained model output.
///
/// Implementations return the raw text of the model's answer. Validating it
/// against the schema is the caller's job: providers do not all enforce
/// `strict` mode.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &StructuredRequest) -> Result<String, LlmError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}
