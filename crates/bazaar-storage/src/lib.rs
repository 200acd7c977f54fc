//! Bazaar Storage crate - SQLite persistence for the marketplace assistant.
//!
//! Provides a WAL-mode SQLite database with migrations, a JSON document store
//! with a Mongo-style filter language for the marketplace collections, the
//! conversation/message repository, account lookup, and bulk seeding.

pub mod accounts;
pub mod conversations;
pub mod db;
pub mod documents;
pub mod filter;
pub mod migrations;
pub mod seed;

pub use accounts::AccountRepository;
pub use conversations::ConversationRepository;
pub use db::Database;
pub use documents::{DocumentStore, FindOptions};
pub use filter::{Condition, Filter, Projection, SortDirection, SortSpec};
pub use seed::{seed_from_csv_dir, seed_from_file, seed_from_json, SeedReport};
