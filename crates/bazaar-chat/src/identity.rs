//! Email-based account resolution.

use std::sync::Arc;

use tracing::debug;

use bazaar_core::types::Account;

use crate::error::ChatError;
use crate::store::AccountDirectory;

/// Maps an email to an account. "Not found" is `Ok(None)`, never an error.
pub struct IdentityResolver {
    directory: Arc<dyn AccountDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, email: &str) -> Result<Option<Account>, ChatError> {
        if email.trim().is_empty() {
            return Err(ChatError::InvalidInput("email cannot be empty".to_string()));
        }
        let account = self.directory.lookup_by_email(email).await?;
        debug!(found = account.is_some(), "Identity resolved");
        Ok(account)
    }
}
