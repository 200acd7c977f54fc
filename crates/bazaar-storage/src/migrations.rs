//! Database schema migrations.
//!
//! Applies the initial schema: the marketplace document table, the
//! conversations table with its embedded message list, and the standalone
//! messages table.

use rusqlite::Connection;
use tracing::info;

use bazaar_core::error::BazaarError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), BazaarError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| BazaarError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| BazaarError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), BazaarError> {
    conn.execute_batch(
        "
        -- Marketplace documents, one JSON body per row.
        CREATE TABLE IF NOT EXISTS documents (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            collection      TEXT NOT NULL
                            CHECK (collection IN ('accounts', 'orders', 'order_items',
                                                  'products', 'inventory_items',
                                                  'distribution_centers')),
            body            TEXT NOT NULL CHECK (json_valid(body)),
            inserted_at     INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_collection
            ON documents (collection, seq);

        CREATE INDEX IF NOT EXISTS idx_documents_email
            ON documents (collection, json_extract(body, '$.email'));

        CREATE INDEX IF NOT EXISTS idx_documents_user_id
            ON documents (collection, json_extract(body, '$.user_id'));

        CREATE INDEX IF NOT EXISTS idx_documents_id
            ON documents (collection, json_extract(body, '$.id'));

        -- Conversations carry a newest-first JSON array of message summaries.
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY NOT NULL,
            user_id         TEXT NOT NULL,
            started_at      TEXT NOT NULL,
            ended_at        TEXT,
            messages        TEXT NOT NULL DEFAULT '[]' CHECK (json_valid(messages))
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_user
            ON conversations (user_id, started_at DESC);

        CREATE TRIGGER IF NOT EXISTS trg_conversations_identity_immutable
            BEFORE UPDATE OF id, user_id, started_at ON conversations
            WHEN NEW.id IS NOT OLD.id
              OR NEW.user_id IS NOT OLD.user_id
              OR NEW.started_at IS NOT OLD.started_at
        BEGIN
            SELECT RAISE(ABORT, 'conversation identity is immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_conversations_end_once
            BEFORE UPDATE OF ended_at ON conversations
            WHEN OLD.ended_at IS NOT NULL
        BEGIN
            SELECT RAISE(ABORT, 'conversation already ended');
        END;

        -- Standalone, immutable message records.
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY NOT NULL,
            conversation_id TEXT NOT NULL,
            type            TEXT NOT NULL CHECK (type IN ('user', 'assistant')),
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, created_at DESC);

        CREATE TRIGGER IF NOT EXISTS trg_messages_immutable
            BEFORE UPDATE ON messages
        BEGIN
            SELECT RAISE(ABORT, 'messages are immutable');
        END;

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| BazaarError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = open();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_documents_reject_unknown_collection() {
        let conn = open();
        let result = conn.execute(
            "INSERT INTO documents (collection, body) VALUES ('admin_secrets', '{}')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_conversation_identity_is_immutable() {
        let conn = open();
        conn.execute(
            "INSERT INTO conversations (id, user_id, started_at) VALUES ('c1', 'u1', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let result = conn.execute("UPDATE conversations SET user_id = 'u2' WHERE id = 'c1'", []);
        assert!(result.is_err());
        let result = conn.execute(
            "UPDATE conversations SET started_at = '2025-01-01T00:00:00Z' WHERE id = 'c1'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_conversation_ends_only_once() {
        let conn = open();
        conn.execute(
            "INSERT INTO conversations (id, user_id, started_at) VALUES ('c1', 'u1', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "UPDATE conversations SET ended_at = '2024-01-02T00:00:00Z' WHERE id = 'c1'",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "UPDATE conversations SET ended_at = '2024-01-03T00:00:00Z' WHERE id = 'c1'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_message_requires_existing_conversation() {
        let conn = open();
        let result = conn.execute(
            "INSERT INTO messages (id, conversation_id, type, content, created_at)
             VALUES ('m1', 'missing', 'user', 'hi', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
