//! Account lookup by email.
//!
//! Accounts are ordinary documents in the `accounts` collection. This module
//! never writes them; only the seeding utility does.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::debug;

use bazaar_core::error::BazaarError;
use bazaar_core::types::Account;

use crate::db::{storage_err, Database};

pub struct AccountRepository {
    db: Arc<Database>,
}

impl AccountRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Exact-match lookup. Returns `Ok(None)` when no account has this email.
    pub fn find_by_email(&self, email: &str) -> Result<Option<Account>, BazaarError> {
        let body: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT body FROM documents
                 WHERE collection = 'accounts' AND json_extract(body, '$.email') = ?1
                 ORDER BY seq ASC LIMIT 1",
                rusqlite::params![email],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err("Failed to look up account"))
        })?;

        let Some(body) = body else {
            debug!("No account for email");
            return Ok(None);
        };

        let account: Account = serde_json::from_str(&body).map_err(|e| {
            BazaarError::Storage(format!("Malformed account record: {}", e))
        })?;
        Ok(Some(account))
    }
}
