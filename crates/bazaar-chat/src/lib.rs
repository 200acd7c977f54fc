//! Conversational pipeline for Bazaar.
//!
//! Classifies inbound messages, resolves the user's account from an email,
//! synthesizes and executes scoped document queries, formats the results and
//! records the conversation.

pub mod classifier;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod identity;
pub mod orchestrator;
pub mod prompts;
pub mod schema;
pub mod store;
pub mod synthesizer;
pub mod types;

pub use classifier::{Classification, IntentClassifier};
pub use error::ChatError;
pub use executor::{QueryExecutor, ResultSet};
pub use formatter::{FormattedResponse, ResponseFormatter};
pub use identity::IdentityResolver;
pub use orchestrator::ChatOrchestrator;
pub use store::{AccountDirectory, ConversationStore, DocumentReader, SqliteStore};
pub use synthesizer::{extract_email, QuerySynthesizer};
pub use types::{TurnOutcome, TurnRequest, TurnState};
