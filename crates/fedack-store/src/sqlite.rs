//! SQLite implementation of the AckStore trait.
//!
//! This is the primary ledger backend. It uses rusqlite with bundled
//! SQLite. One connection per store, guarded by a mutex; separate
//! processes or stores sharing a file are serialized by SQLite itself.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{ffi, params, Connection, OptionalExtension};
use tracing::{debug, info};

use fedack_core::{Clock, FederationAck, LedgerEntry, SystemClock};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AckStore, InsertResult, LedgerCounts};

/// How long a write waits on another connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str = "event_id, batch_id, node_id, event_type, timestamp, nonce, \
                              payload, signature, prev_signature, created_at";

/// SQLite-backed ledger.
pub struct SqliteAckStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl SqliteAckStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = prepare(Connection::open(&path)?)?;
        info!(path = %path.display(), "opened ack ledger");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
            clock,
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::open_memory_with_clock(Arc::new(SystemClock))
    }

    pub fn open_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = prepare(Connection::open_in_memory()?)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            clock,
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&conn)
    }

    fn query_entries<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<LedgerEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map(params, row_to_entry)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

fn prepare(mut conn: Connection) -> Result<Connection> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    migration::migrate(&mut conn)?;
    Ok(conn)
}

/// Primary-key or unique violation: the duplicate outcome, not a failure.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
        ),
        _ => false,
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let payload_json: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(LedgerEntry {
        ack: FederationAck {
            event_id: row.get("event_id")?,
            event_type: row.get("event_type")?,
            timestamp: row.get("timestamp")?,
            nonce: row.get("nonce")?,
            node_id: row.get("node_id")?,
            payload,
            signature: row.get("signature")?,
            prev_signature: row.get("prev_signature")?,
        },
        batch_id: row.get("batch_id")?,
        created_at: row.get("created_at")?,
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl AckStore for SqliteAckStore {
    fn insert_ack(&self, ack: &FederationAck, batch_id: &str) -> Result<InsertResult> {
        let payload = serde_json::to_string(&ack.payload)?;
        let created_at = self.clock.now_millis();

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO ack_ledger (
                    event_id, batch_id, node_id, event_type, timestamp,
                    nonce, payload, signature, prev_signature, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    ack.event_id,
                    batch_id,
                    ack.node_id,
                    ack.event_type,
                    ack.timestamp,
                    ack.nonce,
                    payload,
                    ack.signature,
                    ack.prev_signature,
                    created_at,
                ],
            );

            match inserted {
                Ok(_) => Ok(InsertResult::Inserted),
                Err(e) if is_unique_violation(&e) => {
                    debug!(event_id = %ack.event_id, "duplicate ack ignored");
                    Ok(InsertResult::AlreadyExists)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn has_ack(&self, event_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM ack_ledger WHERE event_id = ?1",
                    params![event_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn get_ack(&self, event_id: &str) -> Result<Option<LedgerEntry>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM ack_ledger WHERE event_id = ?1");
            Ok(conn
                .query_row(&sql, params![event_id], row_to_entry)
                .optional()?)
        })
    }

    fn recent_acks(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.query_entries(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM ack_ledger
                 ORDER BY timestamp DESC, rowid DESC LIMIT ?1"
            ),
            params![limit_param(limit)],
        )
    }

    fn acks_by_batch(&self, batch_id: &str) -> Result<Vec<LedgerEntry>> {
        self.query_entries(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM ack_ledger
                 WHERE batch_id = ?1 ORDER BY timestamp, rowid"
            ),
            params![batch_id],
        )
    }

    fn acks_by_node(&self, node_id: &str) -> Result<Vec<LedgerEntry>> {
        self.query_entries(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM ack_ledger
                 WHERE node_id = ?1 ORDER BY timestamp, rowid"
            ),
            params![node_id],
        )
    }

    fn acks_since(&self, since: i64, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.query_entries(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM ack_ledger
                 WHERE timestamp > ?1 ORDER BY timestamp, rowid LIMIT ?2"
            ),
            params![since, limit_param(limit)],
        )
    }

    fn all_acks(&self) -> Result<Vec<LedgerEntry>> {
        self.query_entries(
            &format!("SELECT {SELECT_COLUMNS} FROM ack_ledger ORDER BY timestamp, rowid"),
            [],
        )
    }

    fn counts(&self) -> Result<LedgerCounts> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    COUNT(*),
                    COUNT(DISTINCT batch_id),
                    COUNT(DISTINCT node_id),
                    COALESCE(MIN(timestamp), 0),
                    COALESCE(MAX(timestamp), 0)
                 FROM ack_ledger",
                [],
                |row| {
                    Ok(LedgerCounts {
                        total_acks: row.get::<_, i64>(0)? as u64,
                        unique_batches: row.get::<_, i64>(1)? as u64,
                        unique_nodes: row.get::<_, i64>(2)? as u64,
                        oldest_ack_timestamp: row.get(3)?,
                        newest_ack_timestamp: row.get(4)?,
                    })
                },
            )?)
        })
    }

    fn last_created_at(&self) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT MAX(created_at) FROM ack_ledger", [], |row| {
                row.get(0)
            })?)
        })
    }

    fn storage_size_bytes(&self) -> Result<u64> {
        match &self.path {
            Some(path) => match std::fs::metadata(path) {
                Ok(meta) => Ok(meta.len()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
                Err(e) => Err(e.into()),
            },
            None => Ok(0),
        }
    }

    fn vacuum(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })?;
        info!("vacuumed ack ledger");
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let removed = self.with_conn(|conn| Ok(conn.execute("DELETE FROM ack_ledger", [])?))?;
        info!(removed, "cleared ack ledger");
        Ok(removed)
    }

    fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.close().map_err(|(_, e)| StoreError::Database(e))?;
        if let Some(path) = &self.path {
            info!(path = %path.display(), "closed ack ledger");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteAckStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAckStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedack_core::{generate_batch_id, AckBuilder, ManualClock, SharedKey};
    use serde_json::json;

    fn key() -> SharedKey {
        SharedKey::from_static("store-test-key")
    }

    fn ack(node: &str, timestamp: i64) -> FederationAck {
        AckBuilder::new(node, "payment.recovered")
            .timestamp(timestamp)
            .payload(json!({"amount": timestamp % 1000, "tags": ["a", "b"]}))
            .sign(&key())
    }

    fn store_at(now: i64) -> (Arc<ManualClock>, SqliteAckStore) {
        let clock = Arc::new(ManualClock::new(now));
        let store = SqliteAckStore::open_memory_with_clock(clock.clone()).unwrap();
        (clock, store)
    }

    #[test]
    fn test_insert_and_get() {
        let (_, store) = store_at(42);
        let ack = ack("node-a", 1_000);
        let batch = generate_batch_id();

        assert_eq!(store.insert_ack(&ack, &batch).unwrap(), InsertResult::Inserted);
        assert!(store.has_ack(&ack.event_id).unwrap());

        let entry = store.get_ack(&ack.event_id).unwrap().unwrap();
        assert_eq!(entry.ack, ack);
        assert_eq!(entry.batch_id, batch);
        assert_eq!(entry.created_at, 42);

        assert!(store.get_ack("ack-missing").unwrap().is_none());
        assert!(!store.has_ack("ack-missing").unwrap());
    }

    #[test]
    fn test_idempotent_insert() {
        let (clock, store) = store_at(1);
        let ack = ack("node-a", 1_000);

        assert_eq!(store.insert_ack(&ack, "batch-1").unwrap(), InsertResult::Inserted);
        clock.set(2);
        assert_eq!(
            store.insert_ack(&ack, "batch-2").unwrap(),
            InsertResult::AlreadyExists
        );

        let recent = store.recent_acks(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].batch_id, "batch-1");
        assert_eq!(recent[0].created_at, 1);
    }

    #[test]
    fn test_prev_signature_round_trip() {
        let (_, store) = store_at(0);
        let first = ack("node-a", 1);
        let second = AckBuilder::new("node-a", "t")
            .timestamp(2)
            .prev(first.signature.clone())
            .sign(&key());

        store.insert_ack(&first, "b").unwrap();
        store.insert_ack(&second, "b").unwrap();

        let stored = store.acks_by_batch("b").unwrap();
        assert_eq!(stored[0].ack.prev_signature, None);
        assert_eq!(stored[1].ack.prev_signature.as_deref(), Some(first.signature.as_str()));
    }

    #[test]
    fn test_query_ordering() {
        let (_, store) = store_at(0);
        for ts in [300, 100, 200, 400] {
            store.insert_ack(&ack("node-a", ts), "batch-x").unwrap();
        }
        store.insert_ack(&ack("node-b", 250), "batch-y").unwrap();

        let ts = |entries: Vec<LedgerEntry>| -> Vec<i64> {
            entries.into_iter().map(|e| e.ack.timestamp).collect()
        };

        assert_eq!(ts(store.recent_acks(3).unwrap()), vec![400, 300, 250]);
        assert_eq!(ts(store.acks_by_batch("batch-x").unwrap()), vec![100, 200, 300, 400]);
        assert_eq!(ts(store.acks_by_node("node-b").unwrap()), vec![250]);
        assert_eq!(ts(store.acks_since(200, 2).unwrap()), vec![250, 300]);
        assert_eq!(ts(store.all_acks().unwrap()), vec![100, 200, 250, 300, 400]);
        assert!(store.acks_since(400, 10).unwrap().is_empty());
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let (_, store) = store_at(0);
        let a = ack("node-a", 5);
        let b = ack("node-b", 5);
        store.insert_ack(&a, "b").unwrap();
        store.insert_ack(&b, "b").unwrap();

        let all = store.all_acks().unwrap();
        assert_eq!(all[0].ack.event_id, a.event_id);
        assert_eq!(all[1].ack.event_id, b.event_id);
    }

    #[test]
    fn test_counts() {
        let (_, store) = store_at(0);
        assert_eq!(store.counts().unwrap(), LedgerCounts::default());
        assert_eq!(store.last_created_at().unwrap(), None);

        let nodes = ["n1", "n2", "n3"];
        let batches = ["batch-1", "batch-2"];
        for i in 0..7i64 {
            let ack = ack(nodes[i as usize % 3], 1_000 + i);
            store.insert_ack(&ack, batches[i as usize % 2]).unwrap();
        }

        let counts = store.counts().unwrap();
        assert_eq!(counts.total_acks, 7);
        assert_eq!(counts.unique_nodes, 3);
        assert_eq!(counts.unique_batches, 2);
        assert_eq!(counts.oldest_ack_timestamp, 1_000);
        assert_eq!(counts.newest_ack_timestamp, 1_006);
    }

    #[test]
    fn test_last_created_at_tracks_ingest_time() {
        let (clock, store) = store_at(10_000);
        store.insert_ack(&ack("n", 99_999), "b").unwrap();
        clock.set(20_000);
        store.insert_ack(&ack("n", 1), "b").unwrap();

        assert_eq!(store.last_created_at().unwrap(), Some(20_000));
    }

    #[test]
    fn test_clear_and_vacuum() {
        let (_, store) = store_at(0);
        for ts in 0..5 {
            store.insert_ack(&ack("n", ts), "b").unwrap();
        }
        assert_eq!(store.clear().unwrap(), 5);
        store.vacuum().unwrap();
        assert_eq!(store.counts().unwrap().total_acks, 0);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ack_ledger.db");
        let ack = ack("node-a", 7);

        let store = SqliteAckStore::open(&path).unwrap();
        store.insert_ack(&ack, "b").unwrap();
        assert!(store.storage_size_bytes().unwrap() > 0);
        store.close().unwrap();

        let store = SqliteAckStore::open(&path).unwrap();
        assert_eq!(store.get_ack(&ack.event_id).unwrap().unwrap().ack, ack);
    }

    #[test]
    fn test_concurrent_duplicate_inserts_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ack_ledger.db");
        SqliteAckStore::open(&path).unwrap().close().unwrap();

        let ack = ack("node-a", 7);
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let path = path.clone();
                let ack = ack.clone();
                std::thread::spawn(move || {
                    let store = SqliteAckStore::open(&path).unwrap();
                    store.insert_ack(&ack, "batch-race").unwrap()
                })
            })
            .collect();

        let results: Vec<InsertResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_inserted()).count();
        assert_eq!(winners, 1);

        let store = SqliteAckStore::open(&path).unwrap();
        assert_eq!(store.counts().unwrap().total_acks, 1);
    }

    #[test]
    fn test_other_errors_propagate() {
        let (_, store) = store_at(0);
        store
            .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE ack_ledger")?))
            .unwrap();

        let err = store.insert_ack(&ack("n", 1), "b").unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
