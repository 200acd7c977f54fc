//! Response schemas for the three structured generation calls.
//!
//! Each schema is sent to the provider and also enforced locally: the parse
//! structs deny unknown fields, and constant fields are checked explicitly.
//! A response that fails either check is rejected whole.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use bazaar_core::types::{Collection, Operation, QueryDescriptor};

use crate::error::ChatError;

pub const INITIAL_RESPONSE: &str = "initial_response";
pub const QUERY_RESPONSE: &str = "query_response";
pub const FINAL_RESPONSE: &str = "final_response";

/// How the model classified its own reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    AskEmail,
    QueryReady,
    GeneralResponse,
}

/// First-turn classification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InitialResponse {
    pub intent: String,
    pub needs_email: bool,
    pub bot_message: String,
    pub response_type: ResponseType,
}

/// Query synthesis output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryResponse {
    pub intent: String,
    pub needs_email: bool,
    pub bot_message: String,
    pub database_query: QueryDescriptor,
    pub response_type: ResponseType,
}

/// Final formatted answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FinalResponse {
    pub bot_message: String,
    pub has_results: bool,
    pub result_count: f64,
}

/// Parse a raw model response under the named schema.
pub fn parse<T: DeserializeOwned>(schema_name: &str, raw: &str) -> Result<T, ChatError> {
    serde_json::from_str(raw.trim()).map_err(|e| {
        ChatError::ClassifierContractViolation(format!("{} does not conform: {}", schema_name, e))
    })
}

/// Parse a query response and check its constant fields.
pub fn parse_query_response(raw: &str) -> Result<QueryResponse, ChatError> {
    let response: QueryResponse = parse(QUERY_RESPONSE, raw)?;
    if response.needs_email {
        return Err(ChatError::ClassifierContractViolation(
            "query_response.needsEmail must be false".to_string(),
        ));
    }
    if response.response_type != ResponseType::QueryReady {
        return Err(ChatError::ClassifierContractViolation(
            "query_response.responseType must be query_ready".to_string(),
        ));
    }
    Ok(response)
}

pub fn initial_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "intent": {
                "type": "string",
                "description": "What the user wants, e.g. find_order, check_status, browse_products"
            },
            "needsEmail": {
                "type": "boolean",
                "description": "Whether the request needs the user's email"
            },
            "botMessage": {
                "type": "string",
                "description": "Reply shown to the user"
            },
            "responseType": {
                "type": "string",
                "enum": ["ask_email", "query_ready", "general_response"]
            }
        },
        "required": ["intent", "needsEmail", "botMessage", "responseType"],
        "additionalProperties": false
    })
}

pub fn query_response_schema() -> Value {
    let collections: Vec<&str> = Collection::ALL.iter().map(|c| c.as_str()).collect();
    let operations: Vec<&str> = Operation::ALL.iter().map(|o| o.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "intent": { "type": "string" },
            "needsEmail": { "type": "boolean", "const": false },
            "botMessage": {
                "type": "string",
                "description": "Progress message, e.g. 'Let me look up your orders...'"
            },
            "databaseQuery": {
                "type": "object",
                "properties": {
                    "collection": { "type": "string", "enum": collections },
                    "query": { "type": "object" },
                    "operation": { "type": "string", "enum": operations },
                    "projection": { "type": "object" },
                    "sort": { "type": "object" },
                    "limit": { "type": "number" }
                },
                "required": ["collection", "query", "operation"]
            },
            "responseType": { "type": "string", "const": "query_ready" }
        },
        "required": ["intent", "needsEmail", "botMessage", "databaseQuery", "responseType"],
        "additionalProperties": false
    })
}

pub fn final_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "botMessage": {
                "type": "string",
                "description": "Final reply shown to the user"
            },
            "hasResults": {
                "type": "boolean",
                "description": "Whether any relevant data was found"
            },
            "resultCount": {
                "type": "number",
                "description": "Number of results found"
            }
        },
        "required": ["botMessage", "hasResults", "resultCount"],
        "additionalProperties": false
    })
}
