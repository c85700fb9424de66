//! Database schema migrations for SQLite.
//!
//! Versioned: each migration moves the schema from version N to N+1 and is
//! recorded in `schema_migrations`. Both the ledger and the nonce store run
//! the same migration set, so either database file can hold either table.

use rusqlite::Connection;

use fedack_core::{Clock, SystemClock};

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    // Refuse a schema from a newer build
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, SystemClock.now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: the ACK ledger.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per accepted ACK
        CREATE TABLE ack_ledger (
            event_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            node_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            timestamp INTEGER NOT NULL,       -- origin time (Unix ms)
            nonce TEXT NOT NULL,
            payload TEXT NOT NULL,            -- JSON
            signature TEXT NOT NULL,          -- hex HMAC-SHA256
            prev_signature TEXT,
            created_at INTEGER NOT NULL       -- ingest time (Unix ms)
        );

        CREATE INDEX idx_ack_ledger_batch_id ON ack_ledger(batch_id);
        CREATE INDEX idx_ack_ledger_node_id ON ack_ledger(node_id);
        CREATE INDEX idx_ack_ledger_timestamp ON ack_ledger(timestamp);
        CREATE INDEX idx_ack_ledger_created_at ON ack_ledger(created_at);
        "#,
    )?;

    Ok(())
}

/// Migration v2: durable nonce store.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Consumed nonces, scoped per context
        CREATE TABLE nonces (
            nonce TEXT NOT NULL,
            context TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            PRIMARY KEY (nonce, context)
        );

        CREATE INDEX idx_nonces_expires ON nonces(expires_at);
        CREATE INDEX idx_nonces_context ON nonces(context);
        "#,
    )?;

    Ok(())
}
