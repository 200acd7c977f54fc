//! Bazaar core crate - shared domain types, configuration and errors.
//!
//! Every other Bazaar crate depends on this one. It has no I/O of its own
//! beyond reading and writing the TOML configuration file.

pub mod config;
pub mod error;
pub mod types;

pub use config::BazaarConfig;
pub use error::{BazaarError, Result};
pub use types::*;
