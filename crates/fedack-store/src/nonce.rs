//! SQLite-backed nonce store.
//!
//! Survives restarts, so a replay is still caught after the verifying
//! process comes back up within the TTL window. Nonces are namespaced by a
//! context string. Storage failures report the nonce as already seen.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use fedack_core::{Clock, NonceStore, SystemClock};

use crate::error::Result;
use crate::migration;

/// Context used by the federation verifier.
pub const FEDERATION_CONTEXT: &str = "federation";

/// Snapshot of the nonce table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonceStats {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
    pub by_context: BTreeMap<String, u64>,
}

/// Durable [`NonceStore`].
pub struct SqliteNonceStore {
    conn: Mutex<Connection>,
    context: String,
    clock: Arc<dyn Clock>,
}

impl SqliteNonceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, clock)
    }

    pub fn open_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(mut conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            context: FEDERATION_CONTEXT.to_string(),
            clock,
        })
    }

    /// Namespace nonces under `context` instead of the federation default.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn expiry(&self, now: i64, ttl: Duration) -> i64 {
        now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
    }

    /// Whether `nonce` is live under this store's context.
    pub fn try_seen(&self, nonce: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM nonces WHERE nonce = ?1 AND context = ?2 AND expires_at > ?3",
                params![nonce, self.context, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record `nonce`, replacing any earlier entry.
    pub fn try_record(&self, nonce: &str, ttl: Duration) -> Result<()> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO nonces (nonce, context, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![nonce, self.context, now, self.expiry(now, ttl)],
        )?;
        Ok(())
    }

    /// Record `nonce` unless a live entry exists, in one statement.
    pub fn try_check_and_record(&self, nonce: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = conn.execute(
            "INSERT INTO nonces (nonce, context, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (nonce, context) DO UPDATE
                SET created_at = excluded.created_at, expires_at = excluded.expires_at
                WHERE nonces.expires_at <= ?3",
            params![nonce, self.context, now, self.expiry(now, ttl)],
        )?;
        Ok(changed == 1)
    }

    /// Delete expired nonces across all contexts. Returns how many went.
    pub fn try_purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = conn.execute("DELETE FROM nonces WHERE expires_at <= ?1", params![now])?;
        debug!(removed, "purged expired nonces");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<NonceStats> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let (total, active): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(expires_at > ?1), 0) FROM nonces",
            params![now],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        // Live entries only.
        let mut stmt = conn.prepare(
            "SELECT context, COUNT(*) FROM nonces WHERE expires_at > ?1 GROUP BY context",
        )?;
        let by_context = stmt
            .query_map(params![now], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        Ok(NonceStats {
            total: total as u64,
            active: active as u64,
            expired: (total - active) as u64,
            by_context,
        })
    }
}

impl NonceStore for SqliteNonceStore {
    fn seen(&self, nonce: &str) -> bool {
        self.try_seen(nonce).unwrap_or_else(|e| {
            warn!(error = %e, "nonce lookup failed; treating nonce as seen");
            true
        })
    }

    fn record(&self, nonce: &str, ttl: Duration) {
        if let Err(e) = self.try_record(nonce, ttl) {
            warn!(error = %e, "failed to record nonce");
        }
    }

    fn check_and_record(&self, nonce: &str, ttl: Duration) -> bool {
        self.try_check_and_record(nonce, ttl).unwrap_or_else(|e| {
            warn!(error = %e, "nonce check failed; rejecting as replay");
            false
        })
    }

    fn purge_expired(&self) -> usize {
        self.try_purge_expired().unwrap_or_else(|e| {
            warn!(error = %e, "failed to purge expired nonces");
            0
        })
    }
}

impl std::fmt::Debug for SqliteNonceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteNonceStore")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
