use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identity
// =============================================================================

/// Unique identifier for a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id supplied by a caller. Returns `None` for malformed input.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a standalone message record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Current time as an RFC 3339 / ISO-8601 string in UTC.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

// =============================================================================
// Conversations & Messages
// =============================================================================

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Assistant,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(MessageType::User),
            "assistant" => Some(MessageType::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A standalone, immutable message record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub conversation_id: ConversationId,
    pub created_at: String,
}

impl Message {
    /// Denormalized copy of this message for a conversation's embedded list.
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            message_id: self.id,
            content: self.content.clone(),
            message_type: self.message_type,
            conversation_id: self.conversation_id,
            created_at: self.created_at.clone(),
        }
    }
}

/// Embedded summary of a message, stored inside its conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub message_id: MessageId,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub conversation_id: ConversationId,
    pub created_at: String,
}

/// A persisted exchange between one user and the assistant.
///
/// `messages` is ordered newest first: index 0 is always the latest message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub messages: Vec<MessageSummary>,
}

impl Conversation {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// The request the conversation was opened with: its oldest user message.
    ///
    /// Later user messages are email replies, including mistyped ones.
    pub fn opening_request(&self) -> Option<&MessageSummary> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.message_type == MessageType::User)
    }

    /// The `n` most recent messages, newest first.
    pub fn recent(&self, n: usize) -> &[MessageSummary] {
        &self.messages[..self.messages.len().min(n)]
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Read-only projection of an account record, resolved by email.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

// =============================================================================
// Query vocabulary
// =============================================================================

/// Collections a query descriptor may target.
///
/// `conversations` and `messages` are deliberately absent: they are written by
/// the conversation store and never exposed to generated queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Accounts,
    Orders,
    OrderItems,
    Products,
    InventoryItems,
    DistributionCenters,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Accounts,
        Collection::Orders,
        Collection::OrderItems,
        Collection::Products,
        Collection::InventoryItems,
        Collection::DistributionCenters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Accounts => "accounts",
            Collection::Orders => "orders",
            Collection::OrderItems => "order_items",
            Collection::Products => "products",
            Collection::InventoryItems => "inventory_items",
            Collection::DistributionCenters => "distribution_centers",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    /// Field holding the owning account id, for account-scoped collections.
    pub fn owner_field(&self) -> Option<&'static str> {
        match self {
            Collection::Accounts => Some("id"),
            Collection::Orders | Collection::OrderItems => Some("user_id"),
            Collection::Products
            | Collection::InventoryItems
            | Collection::DistributionCenters => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read operations a query descriptor may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Find,
    FindOne,
    Aggregate,
    Count,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Find,
        Operation::FindOne,
        Operation::Aggregate,
        Operation::Count,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::FindOne => "findOne",
            Operation::Aggregate => "aggregate",
            Operation::Count => "count",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == value)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of a read, as produced by the query synthesizer.
///
/// `collection` and `operation` stay as raw strings here: the generator is
/// untrusted, and membership in the closed vocabularies is checked by the
/// executor before anything reaches storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub collection: String,
    #[serde(rename = "query", default = "empty_filter")]
    pub filter: serde_json::Value,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
}

fn empty_filter() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl QueryDescriptor {
    pub fn new(collection: &str, operation: &str, filter: serde_json::Value) -> Self {
        Self {
            collection: collection.to_string(),
            filter,
            operation: operation.to_string(),
            projection: None,
            sort: None,
            limit: None,
        }
    }

    pub fn with_projection(mut self, projection: serde_json::Value) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: serde_json::Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit as f64);
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
