//! First-turn intent classification.

use std::sync::Arc;

use tracing::{debug, warn};

use bazaar_llm::{StructuredRequest, TextGenerator};

use crate::error::ChatError;
use crate::prompts;
use crate::schema::{self, InitialResponse, ResponseType};

/// Outcome of classifying a user message.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: String,
    pub needs_email: bool,
    pub assistant_message: String,
    pub response_type: ResponseType,
}

impl From<InitialResponse> for Classification {
    fn from(r: InitialResponse) -> Self {
        Self {
            intent: r.intent,
            needs_email: r.needs_email,
            assistant_message: r.bot_message,
            response_type: r.response_type,
        }
    }
}

pub struct IntentClassifier {
    generator: Arc<dyn TextGenerator>,
}

impl IntentClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Decide whether the request can be answered now or needs an email.
    pub async fn classify(&self, user_text: &str) -> Result<Classification, ChatError> {
        if user_text.trim().is_empty() {
            return Err(ChatError::InvalidInput("message cannot be empty".to_string()));
        }

        let request = StructuredRequest::new(
            schema::INITIAL_RESPONSE,
            schema::initial_response_schema(),
            prompts::classify_system().to_string(),
            user_text.to_string(),
        );
        let raw = self.generator.generate(&request).await?;
        let parsed: InitialResponse = schema::parse(schema::INITIAL_RESPONSE, &raw)
            .inspect_err(|e| warn!(error = %e, "Classifier returned a non-conforming response"))?;

        debug!(
            intent = %parsed.intent,
            needs_email = parsed.needs_email,
            "Message classified"
        );
        Ok(parsed.into())
    }
}
