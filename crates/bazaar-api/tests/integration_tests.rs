//! Integration tests for the Bazaar API.
//!
//! Every test builds its own router over an in-memory database seeded with
//! a couple of accounts and orders, and scripts the text generator.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use bazaar_api::create_router;
use bazaar_api::handlers::{HealthResponse, MessagesResponse};
use bazaar_api::state::AppState;
use bazaar_chat::{ChatOrchestrator, TurnOutcome, TurnState};
use bazaar_core::config::BazaarConfig;
use bazaar_core::types::{Collection, Conversation};
use bazaar_llm::ScriptedGenerator;
use bazaar_storage::{Database, DocumentStore};

// =============================================================================
// Helpers
// =============================================================================

/// Fresh state plus a handle to its scripted generator.
fn make_state_with(config: BazaarConfig) -> (AppState, Arc<ScriptedGenerator>) {
    let db = Arc::new(Database::in_memory().unwrap());
    let docs = DocumentStore::new(db.clone());
    docs.insert_many(
        Collection::Accounts,
        &[
            json!({"id": 42, "email": "a@b.com", "first_name": "Ada"}),
            json!({"id": 7, "email": "c@d.com"}),
        ],
    )
    .unwrap();
    docs.insert_many(
        Collection::Orders,
        &[
            json!({"order_id": 1, "user_id": 42, "status": "Shipped"}),
            json!({"order_id": 2, "user_id": 7, "status": "Processing"}),
        ],
    )
    .unwrap();

    let generator = Arc::new(ScriptedGenerator::new());
    let orchestrator =
        ChatOrchestrator::with_database(db.clone(), generator.clone(), config.chat.clone());
    let state = AppState::new(config, db, orchestrator, "scripted");
    (state, generator)
}

fn make_state() -> (AppState, Arc<ScriptedGenerator>) {
    make_state_with(BazaarConfig::default())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

/// Run a first turn that ends awaiting an email and return the conversation id.
async fn start_awaiting_email(state: &AppState, generator: &ScriptedGenerator) -> String {
    generator.push_json(json!({
        "intent": "find_order",
        "needsEmail": true,
        "botMessage": "What's the email on your account?",
        "responseType": "ask_email"
    }));
    let resp = create_router(state.clone())
        .oneshot(post_json(
            "/chat",
            &json!({"userId": "u1", "message": "where is my order"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: TurnOutcome = body_json(resp).await;
    assert_eq!(outcome.state, TurnState::AwaitingEmail);
    outcome.conversation_id.unwrap().to_string()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_happy_path() {
    let (state, _) = make_state();
    let resp = create_router(state).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let health: HealthResponse = body_json(resp).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.model, "scripted");
    assert!(health.chat_enabled);
    assert_eq!(health.total_conversations, 0);
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_first_turn_general_answer() {
    let (state, generator) = make_state();
    generator.push_json(json!({
        "intent": "browse_products",
        "needsEmail": false,
        "botMessage": "We carry laptops, phones and headphones.",
        "responseType": "general_response"
    }));

    let resp = create_router(state.clone())
        .oneshot(post_json(
            "/chat",
            &json!({"userId": "u1", "message": "what do you sell?"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = body_json(resp).await;
    assert_eq!(body["state"], "ANSWERED");
    assert_eq!(body["needsEmail"], false);
    assert!(body.get("queryResults").is_none());
    assert!(body["conversationId"].is_string());

    let resp = create_router(state).oneshot(get("/health")).await.unwrap();
    let health: HealthResponse = body_json(resp).await;
    assert_eq!(health.total_conversations, 1);
}

#[tokio::test]
async fn test_chat_continuation_returns_scoped_results() {
    let (state, generator) = make_state();
    let id = start_awaiting_email(&state, &generator).await;

    generator.push_json(json!({
        "intent": "find_order",
        "needsEmail": false,
        "botMessage": "Let me look that up...",
        "databaseQuery": {"collection": "orders", "query": {}, "operation": "find"},
        "responseType": "query_ready"
    }));
    generator.push_json(json!({
        "botMessage": "Your order #1 has shipped.",
        "hasResults": true,
        "resultCount": 1
    }));

    let resp = create_router(state.clone())
        .oneshot(post_json(
            "/chat",
            &json!({"userId": "u1", "message": "a@b.com", "conversationId": id}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = body_json(resp).await;
    assert_eq!(body["state"], "ANSWERED");
    assert_eq!(body["conversationId"], id.as_str());
    assert_eq!(body["hasResults"], true);
    assert_eq!(body["resultCount"], 1);
    // The owner filter keeps account 7's order out.
    assert_eq!(body["queryResults"].as_array().unwrap().len(), 1);
    assert_eq!(body["queryResults"][0]["order_id"], 1);
}

#[tokio::test]
async fn test_chat_unknown_email_skips_query() {
    let (state, generator) = make_state();
    let id = start_awaiting_email(&state, &generator).await;

    let resp = create_router(state)
        .oneshot(post_json(
            "/chat",
            &json!({"userId": "u1", "message": "nobody@nowhere.com", "conversationId": id}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let outcome: TurnOutcome = body_json(resp).await;
    assert_eq!(outcome.state, TurnState::Answered);
    assert!(outcome.assistant_message.contains("couldn't find an account"));
    assert!(outcome.query_results.is_none());
    assert_eq!(generator.requests().len(), 1);
}

#[tokio::test]
async fn test_chat_unknown_conversation_is_failed_outcome() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(post_json(
            "/chat",
            &json!({
                "userId": "u1",
                "message": "a@b.com",
                "conversationId": "00000000-0000-0000-0000-000000000000"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let outcome: TurnOutcome = body_json(resp).await;
    assert_eq!(outcome.state, TurnState::Failed);
}

#[tokio::test]
async fn test_chat_missing_message_is_bad_request() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(post_json("/chat", &json!({"userId": "u1"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = body_json(resp).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_chat_missing_user_is_bad_request() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(post_json("/chat", &json!({"message": "hello"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_disabled_is_service_unavailable() {
    let mut config = BazaarConfig::default();
    config.chat.enabled = false;
    let (state, _) = make_state_with(config);

    let resp = create_router(state)
        .oneshot(post_json("/chat", &json!({"userId": "u1", "message": "hi"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Conversations
// =============================================================================

#[tokio::test]
async fn test_get_conversation_with_limit() {
    let (state, generator) = make_state();
    let id = start_awaiting_email(&state, &generator).await;

    let resp = create_router(state.clone())
        .oneshot(get(&format!("/conversations/{}", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let conversation: Conversation = body_json(resp).await;
    assert_eq!(conversation.user_id, "u1");
    assert_eq!(conversation.messages.len(), 2);
    assert!(conversation.is_active());

    let resp = create_router(state)
        .oneshot(get(&format!("/conversations/{}?limit=1", id)))
        .await
        .unwrap();
    let conversation: Conversation = body_json(resp).await;
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(
        conversation.messages[0].content,
        "What's the email on your account?"
    );
}

#[tokio::test]
async fn test_get_conversation_invalid_id() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(get("/conversations/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_conversation_not_found() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(get("/conversations/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_messages() {
    let (state, generator) = make_state();
    let id = start_awaiting_email(&state, &generator).await;

    let resp = create_router(state)
        .oneshot(get(&format!("/conversations/{}/messages", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: MessagesResponse = body_json(resp).await;
    assert_eq!(body.total, 2);
    assert_eq!(body.conversation_id.to_string(), id);
}

#[tokio::test]
async fn test_list_messages_not_found() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(get(
            "/conversations/00000000-0000-0000-0000-000000000000/messages",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_end_conversation_then_conflict() {
    let (state, generator) = make_state();
    let id = start_awaiting_email(&state, &generator).await;
    let uri = format!("/conversations/{}/end", id);

    let resp = create_router(state.clone())
        .oneshot(post_empty(&uri))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let conversation: Conversation = body_json(resp).await;
    assert!(conversation.ended_at.is_some());

    let resp = create_router(state.clone())
        .oneshot(post_empty(&uri))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Turns on an ended conversation are refused without a model call.
    let resp = create_router(state)
        .oneshot(post_json(
            "/chat",
            &json!({"userId": "u1", "message": "a@b.com", "conversationId": id}),
        ))
        .await
        .unwrap();
    let outcome: TurnOutcome = body_json(resp).await;
    assert_eq!(outcome.state, TurnState::Failed);
    assert_eq!(generator.requests().len(), 1);
}

#[tokio::test]
async fn test_end_conversation_not_found() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(post_empty(
            "/conversations/00000000-0000-0000-0000-000000000000/end",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Accounts
// =============================================================================

#[tokio::test]
async fn test_account_status_found() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(get("/accounts/status?email=a@b.com"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = body_json(resp).await;
    assert_eq!(body["exists"], true);
    assert_eq!(body["account"]["id"], 42);
    assert_eq!(body["account"]["first_name"], "Ada");
}

#[tokio::test]
async fn test_account_status_unknown_email() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(get("/accounts/status?email=ghost@x.com"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_account_status_missing_email() {
    let (state, _) = make_state();
    let resp = create_router(state)
        .oneshot(get("/accounts/status"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_rate_limit_exempts_health() {
    let mut config = BazaarConfig::default();
    config.server.rate_limit_per_sec = 0;
    let (state, _) = make_state_with(config);

    let resp = create_router(state.clone())
        .oneshot(get("/health"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = create_router(state)
        .oneshot(get("/accounts/status?email=a@b.com"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = body_json(resp).await;
    assert_eq!(body["error"], "too_many_requests");
}
