//! Query synthesis from a natural-language request.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use bazaar_core::types::QueryDescriptor;
use bazaar_llm::{StructuredRequest, TextGenerator};

use crate::error::ChatError;
use crate::executor;
use crate::prompts;
use crate::schema;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("Invalid email regex")
});

/// First email-like substring of `text`, or the trimmed text when there is
/// none.
pub fn extract_email(text: &str) -> &str {
    match EMAIL_PATTERN.find(text) {
        Some(m) => m.as_str(),
        None => text.trim(),
    }
}

pub struct QuerySynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl QuerySynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Ask the generator for a descriptor answering `original_request` for
    /// `account_id`.
    ///
    /// The returned descriptor has been validated against the vocabularies
    /// and the caller's scope; the executor repeats both checks.
    pub async fn synthesize(
        &self,
        original_request: &str,
        email_text: &str,
        account_id: i64,
    ) -> Result<QueryDescriptor, ChatError> {
        let email = extract_email(email_text);
        let request = StructuredRequest::new(
            schema::QUERY_RESPONSE,
            schema::query_response_schema(),
            prompts::synthesize_system(original_request, email, account_id),
            prompts::synthesize_user(original_request, email, account_id),
        );

        let raw = self.generator.generate(&request).await?;
        let response = schema::parse_query_response(&raw)
            .inspect_err(|e| warn!(error = %e, "Synthesizer returned a non-conforming response"))?;
        let descriptor = response.database_query;

        executor::validate(&descriptor, account_id)?;
        debug!(
            intent = %response.intent,
            collection = %descriptor.collection,
            operation = %descriptor.operation,
            "Query synthesized"
        );
        Ok(descriptor)
    }
}
