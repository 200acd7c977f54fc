//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path/query parameters or a JSON body via axum
//! extractors, drives the chat orchestrator and returns JSON responses.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use bazaar_chat::{TurnOutcome, TurnRequest};
use bazaar_core::types::{Account, Conversation, ConversationId, Message};
use bazaar_storage::ConversationRepository;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    /// Only return the `limit` most recent embedded messages.
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AccountStatusParams {
    pub email: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub model: String,
    pub chat_enabled: bool,
    pub total_conversations: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountStatusResponse {
    pub exists: bool,
    pub account: Account,
}

fn parse_conversation_id(raw: &str) -> Result<ConversationId, ApiError> {
    ConversationId::parse(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid conversation id: {}", raw)))
}

// =============================================================================
// Chat
// =============================================================================

/// POST /chat - run one conversational turn.
///
/// Pipeline failures after validation are reported inside the outcome
/// (`state: FAILED`), so only validation errors surface as HTTP errors.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = state.orchestrator.handle_turn(&request).await?;
    Ok(Json(outcome))
}

// =============================================================================
// Conversations
// =============================================================================

/// GET /conversations/{id} - fetch a conversation with its embedded messages.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ConversationParams>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation_id = parse_conversation_id(&id)?;
    let mut conversation = state
        .orchestrator
        .conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation not found: {}", id)))?;

    if let Some(limit) = params.limit {
        conversation.messages = conversation.recent(limit).to_vec();
    }

    Ok(Json(conversation))
}

/// GET /conversations/{id}/messages - standalone message records, newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let conversation_id = parse_conversation_id(&id)?;
    if state.orchestrator.conversation(conversation_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Conversation not found: {}", id)));
    }

    let messages = state.orchestrator.messages(conversation_id).await?;
    let total = messages.len();
    Ok(Json(MessagesResponse {
        conversation_id,
        messages,
        total,
    }))
}

/// POST /conversations/{id}/end - stamp the conversation's end time.
pub async fn end_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation_id = parse_conversation_id(&id)?;
    let conversation = state.orchestrator.end_conversation(conversation_id).await?;
    Ok(Json(conversation))
}

// =============================================================================
// Accounts
// =============================================================================

/// GET /accounts/status?email= - check whether an account exists for an email.
pub async fn account_status(
    State(state): State<AppState>,
    Query(params): Query<AccountStatusParams>,
) -> Result<Json<AccountStatusResponse>, ApiError> {
    let email = params
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required parameter: email".to_string()))?;

    match state.orchestrator.lookup_account(&email).await? {
        Some(account) => Ok(Json(AccountStatusResponse {
            exists: true,
            account,
        })),
        None => Err(ApiError::NotFound(format!("No account for {}", email.trim()))),
    }
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - liveness and basic statistics.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let uptime = state.start_time.elapsed().as_secs();
    let total_conversations = ConversationRepository::new(state.database.clone())
        .count()
        .unwrap_or(0);

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        model: state.model.clone(),
        chat_enabled: state.config.chat.enabled,
        total_conversations,
    }))
}
