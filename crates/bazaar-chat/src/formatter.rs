//! Natural-language rendering of query results.

use std::sync::Arc;

use tracing::{debug, warn};

use bazaar_llm::{StructuredRequest, TextGenerator};

use crate::error::ChatError;
use crate::executor::ResultSet;
use crate::prompts;
use crate::schema::{self, FinalResponse};

/// Final reply for a data-bearing turn.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResponse {
    pub assistant_message: String,
    pub has_results: bool,
    pub result_count: usize,
}

pub struct ResponseFormatter {
    generator: Arc<dyn TextGenerator>,
}

impl ResponseFormatter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Render `results` as a reply to `original_request`.
    ///
    /// An empty result set never reaches the generator: the reply is a fixed
    /// "no matching records" message. For non-empty results the generator's
    /// `hasResults`/`resultCount` are replaced by the actual size.
    pub async fn format(
        &self,
        original_request: &str,
        results: &ResultSet,
        account_email: &str,
    ) -> Result<FormattedResponse, ChatError> {
        if results.is_empty() {
            debug!("Empty result set, skipping generation");
            return Ok(FormattedResponse {
                assistant_message: no_results_message(account_email),
                has_results: false,
                result_count: 0,
            });
        }

        let serialized = results.to_json().to_string();
        let request = StructuredRequest::new(
            schema::FINAL_RESPONSE,
            schema::final_response_schema(),
            prompts::format_system(original_request, account_email),
            prompts::format_user(original_request, &serialized),
        );

        let raw = self.generator.generate(&request).await?;
        let parsed: FinalResponse = schema::parse(schema::FINAL_RESPONSE, &raw)
            .inspect_err(|e| warn!(error = %e, "Formatter returned a non-conforming response"))?;

        let result_count = results.len();
        if !parsed.has_results || parsed.result_count != result_count as f64 {
            debug!(
                reported = parsed.result_count,
                actual = result_count,
                "Reconciled generated result count"
            );
        }
        Ok(FormattedResponse {
            assistant_message: parsed.bot_message,
            has_results: true,
            result_count,
        })
    }
}

fn no_results_message(email: &str) -> String {
    format!(
        "I couldn't find any matching records for {}. Would you like to browse our products instead?",
        email
    )
}
