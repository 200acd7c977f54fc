//! Request and outcome types for a single chat turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use bazaar_core::types::ConversationId;

/// Inbound turn: one user message, optionally continuing a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl TurnRequest {
    pub fn new(user_id: &str, message: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            message: message.to_string(),
            conversation_id: None,
        }
    }

    pub fn continuing(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }
}

/// Terminal state of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    Answered,
    AwaitingEmail,
    Failed,
}

/// Result of a turn as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub conversation_id: Option<ConversationId>,
    pub state: TurnState,
    pub assistant_message: String,
    pub needs_email: bool,
    /// Raw results, present only on the data-bearing path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_results: Option<Value>,
    pub has_results: bool,
    pub result_count: usize,
}

impl TurnOutcome {
    /// A reply that carries no query results.
    pub fn reply(
        conversation_id: Option<ConversationId>,
        state: TurnState,
        assistant_message: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            state,
            assistant_message: assistant_message.into(),
            needs_email: state == TurnState::AwaitingEmail,
            query_results: None,
            has_results: false,
            result_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request: TurnRequest = serde_json::from_value(json!({
            "userId": "u1",
            "message": "where is my order"
        }))
        .unwrap();
        assert_eq!(request, TurnRequest::new("u1", "where is my order"));

        let missing: TurnRequest = serde_json::from_value(json!({"message": "hi"})).unwrap();
        assert!(missing.user_id.is_empty());
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome = TurnOutcome::reply(None, TurnState::AwaitingEmail, "What's your email?");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["state"], "AWAITING_EMAIL");
        assert_eq!(value["needsEmail"], true);
        assert_eq!(value["assistantMessage"], "What's your email?");
        assert!(value.get("queryResults").is_none());
    }
}
