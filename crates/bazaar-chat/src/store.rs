//! Storage seams used by the chat pipeline.
//!
//! The pipeline is async and the repositories are synchronous rusqlite code,
//! so the SQLite adapter runs every call on the blocking pool. The connection
//! mutex is only ever held inside those closures.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use bazaar_core::types::{
    Account, Collection, Conversation, ConversationId, Message, MessageSummary, MessageType,
};
use bazaar_storage::{
    AccountRepository, ConversationRepository, Database, DocumentStore, Filter, FindOptions,
    Projection, SortSpec,
};

use crate::error::ChatError;

/// Conversation and message persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn start(&self, user_id: &str) -> Result<Conversation, ChatError>;

    /// Standalone message record only.
    async fn insert_message(
        &self,
        conversation_id: ConversationId,
        message_type: MessageType,
        content: &str,
    ) -> Result<Message, ChatError>;

    /// One positional prepend; `summaries[0]` ends at position 0.
    async fn prepend_summaries(
        &self,
        conversation_id: ConversationId,
        summaries: Vec<MessageSummary>,
    ) -> Result<(), ChatError>;

    /// Standalone record, then its summary.
    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message_type: MessageType,
        content: &str,
    ) -> Result<Message, ChatError>;

    async fn get(&self, conversation_id: ConversationId) -> Result<Option<Conversation>, ChatError>;

    async fn end(&self, conversation_id: ConversationId) -> Result<Conversation, ChatError>;

    async fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, ChatError>;
}

/// Account registry lookup.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<Account>, ChatError>;
}

/// Read access to the marketplace collections.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn find(
        &self,
        collection: Collection,
        filter: Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>, ChatError>;

    async fn find_one(
        &self,
        collection: Collection,
        filter: Filter,
        projection: Option<Projection>,
        sort: Option<SortSpec>,
    ) -> Result<Option<Value>, ChatError>;

    async fn count(&self, collection: Collection, filter: Filter) -> Result<u64, ChatError>;
}

// =============================================================================
// SQLite adapter
// =============================================================================

/// All three seams backed by one shared [`Database`].
#[derive(Clone)]
pub struct SqliteStore {
    conversations: Arc<ConversationRepository>,
    accounts: Arc<AccountRepository>,
    documents: Arc<DocumentStore>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            conversations: Arc::new(ConversationRepository::new(db.clone())),
            accounts: Arc::new(AccountRepository::new(db.clone())),
            documents: Arc::new(DocumentStore::new(db)),
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn conversations(&self) -> &ConversationRepository {
        &self.conversations
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn start(&self, user_id: &str) -> Result<Conversation, ChatError> {
        let repo = self.conversations.clone();
        let user_id = user_id.to_string();
        Ok(tokio::task::spawn_blocking(move || repo.start(&user_id)).await??)
    }

    async fn insert_message(
        &self,
        conversation_id: ConversationId,
        message_type: MessageType,
        content: &str,
    ) -> Result<Message, ChatError> {
        let repo = self.conversations.clone();
        let content = content.to_string();
        Ok(tokio::task::spawn_blocking(move || {
            repo.insert_message(conversation_id, message_type, &content)
        })
        .await??)
    }

    async fn prepend_summaries(
        &self,
        conversation_id: ConversationId,
        summaries: Vec<MessageSummary>,
    ) -> Result<(), ChatError> {
        let repo = self.conversations.clone();
        Ok(tokio::task::spawn_blocking(move || {
            repo.prepend_summaries(conversation_id, &summaries)
        })
        .await??)
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message_type: MessageType,
        content: &str,
    ) -> Result<Message, ChatError> {
        let repo = self.conversations.clone();
        let content = content.to_string();
        Ok(tokio::task::spawn_blocking(move || {
            repo.append_message(conversation_id, message_type, &content)
        })
        .await??)
    }

    async fn get(&self, conversation_id: ConversationId) -> Result<Option<Conversation>, ChatError> {
        let repo = self.conversations.clone();
        Ok(tokio::task::spawn_blocking(move || repo.get(conversation_id)).await??)
    }

    async fn end(&self, conversation_id: ConversationId) -> Result<Conversation, ChatError> {
        let repo = self.conversations.clone();
        Ok(tokio::task::spawn_blocking(move || repo.end(conversation_id)).await??)
    }

    async fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, ChatError> {
        let repo = self.conversations.clone();
        Ok(tokio::task::spawn_blocking(move || repo.list_messages(conversation_id)).await??)
    }
}

#[async_trait]
impl AccountDirectory for SqliteStore {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<Account>, ChatError> {
        let repo = self.accounts.clone();
        let email = email.to_string();
        Ok(tokio::task::spawn_blocking(move || repo.find_by_email(&email)).await??)
    }
}

#[async_trait]
impl DocumentReader for SqliteStore {
    async fn find(
        &self,
        collection: Collection,
        filter: Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>, ChatError> {
        let store = self.documents.clone();
        Ok(tokio::task::spawn_blocking(move || store.find(collection, &filter, &options)).await??)
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: Filter,
        projection: Option<Projection>,
        sort: Option<SortSpec>,
    ) -> Result<Option<Value>, ChatError> {
        let store = self.documents.clone();
        Ok(tokio::task::spawn_blocking(move || {
            store.find_one(collection, &filter, projection.as_ref(), sort.as_ref())
        })
        .await??)
    }

    async fn count(&self, collection: Collection, filter: Filter) -> Result<u64, ChatError> {
        let store = self.documents.clone();
        Ok(tokio::task::spawn_blocking(move || store.count(collection, &filter)).await??)
    }
}
