//! Chat orchestrator: drives one turn through the pipeline.
//!
//! A turn without a conversation id starts a conversation and classifies the
//! message. A turn with one is treated as the user supplying their email for
//! the request they made earlier: the email is resolved to an account, a
//! query is synthesized, executed and formatted, and both messages are
//! recorded.
//!
//! Once input validation passes, every failure becomes a conversational
//! reply. Callers only ever see `Err` for a rejected request.

use std::sync::Arc;

use tracing::{error, info, warn};

use bazaar_core::config::ChatConfig;
use bazaar_core::types::{Account, Conversation, ConversationId, Message, MessageType};
use bazaar_llm::TextGenerator;
use bazaar_storage::Database;

use crate::classifier::IntentClassifier;
use crate::error::ChatError;
use crate::executor::QueryExecutor;
use crate::formatter::ResponseFormatter;
use crate::identity::IdentityResolver;
use crate::store::{AccountDirectory, ConversationStore, DocumentReader, SqliteStore};
use crate::synthesizer::{extract_email, QuerySynthesizer};
use crate::types::{TurnOutcome, TurnRequest, TurnState};

/// Reply for any failure after validation.
pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

const CONVERSATION_NOT_FOUND: &str =
    "I couldn't find that conversation. Please start a new one.";

const CONVERSATION_ENDED: &str =
    "This conversation has ended. Please start a new one to continue.";

/// Central coordinator for chat turns.
pub struct ChatOrchestrator {
    conversations: Arc<dyn ConversationStore>,
    classifier: IntentClassifier,
    identity: IdentityResolver,
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    formatter: ResponseFormatter,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        conversations: Arc<dyn ConversationStore>,
        accounts: Arc<dyn AccountDirectory>,
        documents: Arc<dyn DocumentReader>,
        config: ChatConfig,
    ) -> Self {
        Self {
            conversations,
            classifier: IntentClassifier::new(generator.clone()),
            identity: IdentityResolver::new(accounts),
            synthesizer: QuerySynthesizer::new(generator.clone()),
            executor: QueryExecutor::new(documents),
            formatter: ResponseFormatter::new(generator),
            config,
        }
    }

    /// Orchestrator over a single SQLite database.
    pub fn with_database(
        db: Arc<Database>,
        generator: Arc<dyn TextGenerator>,
        config: ChatConfig,
    ) -> Self {
        let store = Arc::new(SqliteStore::new(db));
        Self::new(generator, store.clone(), store.clone(), store, config)
    }

    /// Process one inbound message.
    pub async fn handle_turn(&self, request: &TurnRequest) -> Result<TurnOutcome, ChatError> {
        self.validate(request)?;

        let conversation_id = request
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        Ok(match conversation_id {
            None => self.first_turn(request).await,
            Some(id) => self.continuation(id, request).await,
        })
    }

    fn validate(&self, request: &TurnRequest) -> Result<(), ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        if request.user_id.trim().is_empty() {
            return Err(ChatError::InvalidInput("userId is required".to_string()));
        }
        if request.message.trim().is_empty() {
            return Err(ChatError::InvalidInput("message is required".to_string()));
        }
        let length = request.message.chars().count();
        if length > self.config.max_message_length {
            return Err(ChatError::InvalidInput(format!(
                "message exceeds maximum length of {} characters",
                self.config.max_message_length
            )));
        }
        Ok(())
    }

    // =========================================================================
    // First turn
    // =========================================================================

    async fn first_turn(&self, request: &TurnRequest) -> TurnOutcome {
        let conversation = match self.conversations.start(&request.user_id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                log_failure(&e);
                return TurnOutcome::reply(None, TurnState::Failed, APOLOGY);
            }
        };
        info!(
            conversation_id = %conversation.id,
            user_id = %request.user_id,
            "Conversation started"
        );

        if let Err(e) = self
            .conversations
            .append_message(conversation.id, MessageType::User, &request.message)
            .await
        {
            return self
                .fail_turn(conversation.id, Some(&request.message), e)
                .await;
        }

        match self.classify_and_reply(conversation.id, request).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail_turn(conversation.id, None, e).await,
        }
    }

    /// Classify an already recorded user message and record the reply.
    async fn classify_and_reply(
        &self,
        conversation_id: ConversationId,
        request: &TurnRequest,
    ) -> Result<TurnOutcome, ChatError> {
        let classification = self.classifier.classify(&request.message).await?;
        self.conversations
            .append_message(
                conversation_id,
                MessageType::Assistant,
                &classification.assistant_message,
            )
            .await?;

        let state = if classification.needs_email {
            TurnState::AwaitingEmail
        } else {
            TurnState::Answered
        };
        info!(
            conversation_id = %conversation_id,
            intent = %classification.intent,
            state = ?state,
            "First turn complete"
        );
        Ok(TurnOutcome::reply(
            Some(conversation_id),
            state,
            classification.assistant_message,
        ))
    }

    // =========================================================================
    // Continuation
    // =========================================================================

    async fn continuation(&self, raw_id: &str, request: &TurnRequest) -> TurnOutcome {
        let Some(conversation_id) = ConversationId::parse(raw_id) else {
            warn!(conversation_id = raw_id, "Malformed conversation id");
            return TurnOutcome::reply(None, TurnState::Failed, CONVERSATION_NOT_FOUND);
        };

        let conversation = match self.conversations.get(conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                warn!(conversation_id = %conversation_id, "Conversation not found");
                return TurnOutcome::reply(
                    Some(conversation_id),
                    TurnState::Failed,
                    CONVERSATION_NOT_FOUND,
                );
            }
            Err(e) => {
                log_failure(&e);
                return TurnOutcome::reply(Some(conversation_id), TurnState::Failed, APOLOGY);
            }
        };

        if !conversation.is_active() {
            info!(conversation_id = %conversation_id, "Turn refused on ended conversation");
            return TurnOutcome::reply(
                Some(conversation_id),
                TurnState::Failed,
                CONVERSATION_ENDED,
            );
        }

        match self.answer_with_account(&conversation, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_turn(conversation_id, Some(&request.message), e)
                    .await
            }
        }
    }

    async fn answer_with_account(
        &self,
        conversation: &Conversation,
        request: &TurnRequest,
    ) -> Result<TurnOutcome, ChatError> {
        let conversation_id = conversation.id;
        let original_request = conversation
            .opening_request()
            .map(|m| m.content.as_str())
            .unwrap_or(request.message.as_str());
        let email = extract_email(&request.message);

        let Some(account) = self.identity.resolve(email).await? else {
            return self.no_account(conversation_id, request, email).await;
        };

        let descriptor = self
            .synthesizer
            .synthesize(original_request, &request.message, account.id)
            .await?;
        let results = self.executor.execute(&descriptor, account.id).await?;
        let formatted = self
            .formatter
            .format(original_request, &results, email)
            .await?;

        self.record_exchange(conversation_id, &request.message, &formatted.assistant_message)
            .await?;

        log_answered(conversation_id, &account, formatted.result_count);
        Ok(TurnOutcome {
            conversation_id: Some(conversation_id),
            state: TurnState::Answered,
            assistant_message: formatted.assistant_message,
            needs_email: false,
            query_results: Some(results.to_json()),
            has_results: formatted.has_results,
            result_count: formatted.result_count,
        })
    }

    async fn no_account(
        &self,
        conversation_id: ConversationId,
        request: &TurnRequest,
        email: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let reply = format!(
            "I couldn't find an account with the email {}. Please check your email address or create an account.",
            email
        );
        self.conversations
            .append_message(conversation_id, MessageType::User, &request.message)
            .await?;
        self.conversations
            .append_message(conversation_id, MessageType::Assistant, &reply)
            .await?;
        info!(conversation_id = %conversation_id, "No account for supplied email");
        Ok(TurnOutcome::reply(
            Some(conversation_id),
            TurnState::Answered,
            reply,
        ))
    }

    /// Write both standalone records concurrently, then both summaries in one
    /// prepend so the assistant reply ends up at position 0.
    async fn record_exchange(
        &self,
        conversation_id: ConversationId,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), ChatError> {
        let (user, assistant) = tokio::try_join!(
            self.conversations
                .insert_message(conversation_id, MessageType::User, user_text),
            self.conversations
                .insert_message(conversation_id, MessageType::Assistant, assistant_text),
        )?;
        self.conversations
            .prepend_summaries(conversation_id, vec![assistant.summary(), user.summary()])
            .await
    }

    // =========================================================================
    // Failure boundary
    // =========================================================================

    /// Log `err`, record the apology (and the user message when it has not been
    /// recorded yet) on a best-effort basis, and produce a failed outcome.
    async fn fail_turn(
        &self,
        conversation_id: ConversationId,
        unrecorded_user_message: Option<&str>,
        err: ChatError,
    ) -> TurnOutcome {
        log_failure(&err);

        if let Some(text) = unrecorded_user_message {
            if let Err(e) = self
                .conversations
                .append_message(conversation_id, MessageType::User, text)
                .await
            {
                warn!(conversation_id = %conversation_id, error = %e, "Could not record user message");
            }
        }
        if let Err(e) = self
            .conversations
            .append_message(conversation_id, MessageType::Assistant, APOLOGY)
            .await
        {
            warn!(conversation_id = %conversation_id, error = %e, "Could not record apology");
        }

        TurnOutcome::reply(Some(conversation_id), TurnState::Failed, APOLOGY)
    }

    // =========================================================================
    // Read-side passthroughs
    // =========================================================================

    pub async fn conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, ChatError> {
        self.conversations.get(conversation_id).await
    }

    pub async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, ChatError> {
        self.conversations.list_messages(conversation_id).await
    }

    pub async fn end_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, ChatError> {
        let conversation = self.conversations.end(conversation_id).await?;
        info!(conversation_id = %conversation_id, "Conversation ended");
        Ok(conversation)
    }

    pub async fn lookup_account(&self, email: &str) -> Result<Option<Account>, ChatError> {
        self.identity.resolve(email).await
    }
}

fn log_failure(err: &ChatError) {
    match err {
        ChatError::StorageFailure(_) => error!(error = %err, "Turn failed on storage"),
        ChatError::ScopeViolation(_) | ChatError::UnsupportedOperation(_) => {
            warn!(error = %err, "Turn failed on a rejected query")
        }
        _ => warn!(error = %err, "Turn failed"),
    }
}

fn log_answered(conversation_id: ConversationId, account: &Account, result_count: usize) {
    info!(
        conversation_id = %conversation_id,
        account_id = account.id,
        result_count,
        "Continuation answered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::types::Collection;
    use bazaar_llm::ScriptedGenerator;
    use bazaar_storage::{ConversationRepository, DocumentStore};
    use serde_json::{json, Value};

    struct Harness {
        db: Arc<Database>,
        generator: Arc<ScriptedGenerator>,
        orchestrator: ChatOrchestrator,
    }

    impl Harness {
        fn new() -> Self {
            let db = Arc::new(Database::in_memory().unwrap());
            let docs = DocumentStore::new(db.clone());
            docs.insert_many(
                Collection::Accounts,
                &[
                    json!({"id": 42, "email": "a@b.com", "first_name": "Ada"}),
                    json!({"id": 7, "email": "c@d.com"}),
                    json!({"id": 99, "email": "quiet@x.com"}),
                ],
            )
            .unwrap();
            docs.insert_many(
                Collection::Orders,
                &[
                    json!({"order_id": 1, "user_id": 42, "status": "Shipped"}),
                    json!({"order_id": 2, "user_id": 42, "status": "Processing"}),
                    json!({"order_id": 3, "user_id": 7, "status": "Shipped"}),
                ],
            )
            .unwrap();

            let generator = Arc::new(ScriptedGenerator::new());
            let orchestrator =
                ChatOrchestrator::with_database(db.clone(), generator.clone(), ChatConfig::default());
            Self {
                db,
                generator,
                orchestrator,
            }
        }

        fn repo(&self) -> ConversationRepository {
            ConversationRepository::new(self.db.clone())
        }

        fn script_initial(&self, needs_email: bool, message: &str) {
            self.generator.push_json(json!({
                "intent": if needs_email { "find_order" } else { "browse_products" },
                "needsEmail": needs_email,
                "botMessage": message,
                "responseType": if needs_email { "ask_email" } else { "general_response" }
            }));
        }

        fn script_query(&self, database_query: Value) {
            self.generator.push_json(json!({
                "intent": "find_order",
                "needsEmail": false,
                "botMessage": "Let me look that up...",
                "databaseQuery": database_query,
                "responseType": "query_ready"
            }));
        }

        fn script_final(&self, message: &str, count: usize) {
            self.generator.push_json(json!({
                "botMessage": message,
                "hasResults": count > 0,
                "resultCount": count
            }));
        }

        /// First turn that ends awaiting an email.
        async fn awaiting_email(&self, message: &str) -> ConversationId {
            self.script_initial(true, "Sure! What's the email on your account?");
            let outcome = self
                .orchestrator
                .handle_turn(&TurnRequest::new("u1", message))
                .await
                .unwrap();
            assert_eq!(outcome.state, TurnState::AwaitingEmail);
            outcome.conversation_id.unwrap()
        }
    }

    #[tokio::test]
    async fn test_first_turn_direct_answer() {
        let h = Harness::new();
        h.script_initial(false, "We have plenty of electronics! Here are some categories...");

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "show me electronics"))
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::Answered);
        assert!(!outcome.needs_email);
        assert!(outcome.query_results.is_none());
        assert!(outcome.assistant_message.contains("electronics"));

        let repo = h.repo();
        assert_eq!(repo.count().unwrap(), 1);
        let conversation = repo.get(outcome.conversation_id.unwrap()).unwrap().unwrap();
        assert_eq!(conversation.user_id, "u1");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].message_type, MessageType::Assistant);
        assert_eq!(conversation.messages[1].message_type, MessageType::User);
        assert_eq!(conversation.messages[1].content, "show me electronics");
        assert_eq!(repo.list_messages(conversation.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_first_turn_asks_for_email() {
        let h = Harness::new();
        let id = h.awaiting_email("where is my order").await;
        let conversation = h.repo().get(id).unwrap().unwrap();
        assert_eq!(
            conversation.messages[0].content,
            "Sure! What's the email on your account?"
        );
        assert_eq!(h.generator.requests()[0].schema_name, "initial_response");
    }

    #[tokio::test]
    async fn test_continuation_answers_scoped_query() {
        let h = Harness::new();
        let id = h.awaiting_email("where is my order").await;
        h.script_query(json!({"collection": "orders", "query": {"user_id": 42}, "operation": "find"}));
        h.script_final("Order #1 has shipped and order #2 is processing.", 2);

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "it's a@b.com").continuing(id))
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::Answered);
        assert_eq!(outcome.conversation_id, Some(id));
        assert!(outcome.has_results);
        assert_eq!(outcome.result_count, 2);
        let results = outcome.query_results.unwrap();
        let ids: Vec<i64> = results
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["order_id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);

        let requests = h.generator.requests();
        assert_eq!(requests[1].schema_name, "query_response");
        assert!(requests[1].system.contains("where is my order"));
        assert!(requests[1].system.contains("user_id: 42"));
        assert_eq!(requests[2].schema_name, "final_response");

        let conversation = h.repo().get(id).unwrap().unwrap();
        let contents: Vec<&str> = conversation
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            contents,
            vec![
                "Order #1 has shipped and order #2 is processing.",
                "it's a@b.com",
                "Sure! What's the email on your account?",
                "where is my order",
            ]
        );
        assert_eq!(conversation.messages[0].message_type, MessageType::Assistant);
        assert_eq!(h.repo().list_messages(id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unscoped_generated_query_is_pinned() {
        let h = Harness::new();
        let id = h.awaiting_email("show my orders").await;
        h.script_query(json!({"collection": "orders", "query": {}, "operation": "find"}));
        h.script_final("You have two orders.", 2);

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "a@b.com").continuing(id))
            .await
            .unwrap();
        let results = outcome.query_results.unwrap();
        assert!(results
            .as_array()
            .unwrap()
            .iter()
            .all(|d| d["user_id"] == 42));
    }

    #[tokio::test]
    async fn test_foreign_account_query_fails_turn() {
        let h = Harness::new();
        let id = h.awaiting_email("show my orders").await;
        h.script_query(json!({"collection": "orders", "query": {"user_id": 7}, "operation": "find"}));

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "a@b.com").continuing(id))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Failed);
        assert_eq!(outcome.assistant_message, APOLOGY);
        assert!(outcome.query_results.is_none());

        let conversation = h.repo().get(id).unwrap().unwrap();
        assert_eq!(conversation.messages[0].content, APOLOGY);
        assert_eq!(conversation.messages[0].message_type, MessageType::Assistant);
        assert_eq!(conversation.messages[1].content, "a@b.com");
        assert_eq!(h.generator.remaining(), 0);
    }

    #[tokio::test]
    async fn test_unknown_email_answers_without_query() {
        let h = Harness::new();
        let id = h.awaiting_email("where is my order").await;

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "nobody@nowhere.io").continuing(id))
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::Answered);
        assert!(outcome
            .assistant_message
            .contains("couldn't find an account with the email nobody@nowhere.io"));
        assert!(outcome.query_results.is_none());
        assert_eq!(h.generator.requests().len(), 1);

        let conversation = h.repo().get(id).unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 4);
        assert_eq!(conversation.messages[1].content, "nobody@nowhere.io");
    }

    #[tokio::test]
    async fn test_email_retry_keeps_opening_request() {
        let h = Harness::new();
        let id = h.awaiting_email("where is my order").await;

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "nobody@nowhere.io").continuing(id))
            .await
            .unwrap();
        assert!(outcome.assistant_message.contains("couldn't find an account"));

        h.script_query(json!({"collection": "orders", "query": {"user_id": 42}, "operation": "find"}));
        h.script_final("Order #1 has shipped and order #2 is processing.", 2);
        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "a@b.com").continuing(id))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Answered);

        let requests = h.generator.requests();
        assert_eq!(requests.len(), 3);
        for request in &requests[1..] {
            assert!(request.system.contains("where is my order"));
            assert!(!request.system.contains("nobody@nowhere.io"));
        }
    }

    #[tokio::test]
    async fn test_projection_suppressing_id_answers() {
        let h = Harness::new();
        let id = h.awaiting_email("what's the status of my orders").await;
        h.script_query(json!({
            "collection": "orders",
            "query": {"user_id": 42},
            "operation": "find",
            "projection": {"_id": 0, "order_id": 1, "status": 1}
        }));
        h.script_final("Order #1 has shipped and order #2 is processing.", 2);

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "a@b.com").continuing(id))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Answered);
        assert_eq!(
            outcome.query_results,
            Some(json!([
                {"order_id": 1, "status": "Shipped"},
                {"order_id": 2, "status": "Processing"}
            ]))
        );
    }

    #[tokio::test]
    async fn test_empty_results_reply_without_formatter() {
        let h = Harness::new();
        let id = h.awaiting_email("where is my order").await;
        h.script_query(json!({"collection": "orders", "query": {"user_id": 99}, "operation": "find"}));

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "quiet@x.com").continuing(id))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Answered);
        assert!(!outcome.has_results);
        assert_eq!(outcome.result_count, 0);
        assert_eq!(outcome.query_results, Some(json!([])));
        assert!(outcome.assistant_message.contains("quiet@x.com"));
        assert_eq!(h.generator.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_aggregate_fails_turn() {
        let h = Harness::new();
        let id = h.awaiting_email("total spend").await;
        h.script_query(json!({"collection": "orders", "query": {"user_id": 42}, "operation": "aggregate"}));
        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "a@b.com").continuing(id))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Failed);
    }

    #[tokio::test]
    async fn test_classifier_violation_fails_turn_but_records_apology() {
        let h = Harness::new();
        h.generator.push_text("not json at all");

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "hello"))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Failed);
        assert_eq!(outcome.assistant_message, APOLOGY);

        let conversation = h.repo().get(outcome.conversation_id.unwrap()).unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].message_type, MessageType::Assistant);
        assert_eq!(conversation.messages[1].content, "hello");
    }

    #[tokio::test]
    async fn test_invalid_input_has_no_side_effects() {
        let h = Harness::new();
        for request in [TurnRequest::new("", "hello"), TurnRequest::new("u1", "   ")] {
            let result = h.orchestrator.handle_turn(&request).await;
            assert!(matches!(result, Err(ChatError::InvalidInput(_))));
        }
        let too_long = "x".repeat(ChatConfig::default().max_message_length + 1);
        let result = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", &too_long))
            .await;
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));

        assert_eq!(h.repo().count().unwrap(), 0);
        assert!(h.generator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_chat_rejects_turns() {
        let db = Arc::new(Database::in_memory().unwrap());
        let config = ChatConfig {
            enabled: false,
            ..ChatConfig::default()
        };
        let orchestrator =
            ChatOrchestrator::with_database(db, Arc::new(ScriptedGenerator::new()), config);
        let result = orchestrator.handle_turn(&TurnRequest::new("u1", "hi")).await;
        assert!(matches!(result, Err(ChatError::Disabled)));
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let h = Harness::new();
        let missing = ConversationId::new();
        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "a@b.com").continuing(missing))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Failed);
        assert_eq!(outcome.assistant_message, CONVERSATION_NOT_FOUND);
        assert_eq!(h.repo().count().unwrap(), 0);

        let mut malformed = TurnRequest::new("u1", "a@b.com");
        malformed.conversation_id = Some("not-a-uuid".to_string());
        let outcome = h.orchestrator.handle_turn(&malformed).await.unwrap();
        assert_eq!(outcome.state, TurnState::Failed);
        assert!(outcome.conversation_id.is_none());
    }

    #[tokio::test]
    async fn test_ended_conversation_refuses_turn() {
        let h = Harness::new();
        let id = h.awaiting_email("where is my order").await;
        h.orchestrator.end_conversation(id).await.unwrap();

        let outcome = h
            .orchestrator
            .handle_turn(&TurnRequest::new("u1", "a@b.com").continuing(id))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Failed);
        assert_eq!(outcome.assistant_message, CONVERSATION_ENDED);
        assert_eq!(h.repo().get(id).unwrap().unwrap().messages.len(), 2);

        assert!(matches!(
            h.orchestrator.end_conversation(id).await,
            Err(ChatError::ConversationEnded(_))
        ));
    }

    #[tokio::test]
    async fn test_identical_first_turns_are_independent() {
        let h = Harness::new();
        let a = h.awaiting_email("where is my order").await;
        let b = h.awaiting_email("where is my order").await;
        assert_ne!(a, b);
        assert_eq!(h.repo().count().unwrap(), 2);
    }

    /// Delegates to SQLite but fails the first `append_message` call.
    struct FailFirstAppend {
        inner: SqliteStore,
        armed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ConversationStore for FailFirstAppend {
        async fn start(&self, user_id: &str) -> Result<Conversation, ChatError> {
            self.inner.start(user_id).await
        }

        async fn insert_message(
            &self,
            conversation_id: ConversationId,
            message_type: MessageType,
            content: &str,
        ) -> Result<Message, ChatError> {
            self.inner
                .insert_message(conversation_id, message_type, content)
                .await
        }

        async fn prepend_summaries(
            &self,
            conversation_id: ConversationId,
            summaries: Vec<bazaar_core::types::MessageSummary>,
        ) -> Result<(), ChatError> {
            self.inner.prepend_summaries(conversation_id, summaries).await
        }

        async fn append_message(
            &self,
            conversation_id: ConversationId,
            message_type: MessageType,
            content: &str,
        ) -> Result<Message, ChatError> {
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(ChatError::StorageFailure("disk full".to_string()));
            }
            self.inner
                .append_message(conversation_id, message_type, content)
                .await
        }

        async fn get(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Option<Conversation>, ChatError> {
            self.inner.get(conversation_id).await
        }

        async fn end(&self, conversation_id: ConversationId) -> Result<Conversation, ChatError> {
            self.inner.end(conversation_id).await
        }

        async fn list_messages(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Vec<Message>, ChatError> {
            self.inner.list_messages(conversation_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_user_write_is_retried_with_apology() {
        let db = Arc::new(Database::in_memory().unwrap());
        let sqlite = Arc::new(SqliteStore::new(db.clone()));
        let conversations = Arc::new(FailFirstAppend {
            inner: SqliteStore::new(db.clone()),
            armed: std::sync::atomic::AtomicBool::new(true),
        });
        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = ChatOrchestrator::new(
            generator.clone(),
            conversations,
            sqlite.clone(),
            sqlite,
            ChatConfig::default(),
        );

        let outcome = orchestrator
            .handle_turn(&TurnRequest::new("u1", "hello"))
            .await
            .unwrap();
        assert_eq!(outcome.state, TurnState::Failed);
        assert!(generator.requests().is_empty());

        let conversation = ConversationRepository::new(db)
            .get(outcome.conversation_id.unwrap())
            .unwrap()
            .unwrap();
        let contents: Vec<(&str, MessageType)> = conversation
            .messages
            .iter()
            .map(|m| (m.content.as_str(), m.message_type))
            .collect();
        assert_eq!(
            contents,
            vec![(APOLOGY, MessageType::Assistant), ("hello", MessageType::User)]
        );
    }
}
