//! AckStore trait: the abstract interface for ledger persistence.
//!
//! Implementations include SQLite (primary) and in-memory (for tests).
//! Every operation is synchronous and returns when the storage engine has
//! committed or failed.

use fedack_core::{FederationAck, LedgerEntry};

use crate::error::Result;

/// Result of inserting an ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// ACK was inserted.
    Inserted,
    /// An ACK with this `event_id` already exists (idempotent - not an error).
    AlreadyExists,
}

impl InsertResult {
    pub fn is_inserted(self) -> bool {
        matches!(self, InsertResult::Inserted)
    }
}

/// Aggregate counts over the ledger table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub total_acks: u64,
    pub unique_batches: u64,
    pub unique_nodes: u64,
    /// Smallest `timestamp`, 0 when empty.
    pub oldest_ack_timestamp: i64,
    /// Largest `timestamp`, 0 when empty.
    pub newest_ack_timestamp: i64,
}

/// Idempotent, queryable ACK ledger.
///
/// # Design Notes
///
/// - **Idempotent inserts**: a second insert with the same `event_id`
///   returns `AlreadyExists` and leaves the stored row untouched.
/// - **Ordering**: range queries order by `timestamp`; ties fall back to
///   insertion order.
/// - **Concurrency**: duplicate races are settled by the storage engine's
///   uniqueness constraint; exactly one concurrent insert wins.
pub trait AckStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert `ack` under `batch_id`, stamping `created_at` with the store's
    /// clock.
    fn insert_ack(&self, ack: &FederationAck, batch_id: &str) -> Result<InsertResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Point lookups
    // ─────────────────────────────────────────────────────────────────────────

    fn has_ack(&self, event_id: &str) -> Result<bool>;

    fn get_ack(&self, event_id: &str) -> Result<Option<LedgerEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Range queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The `limit` ACKs with the largest `timestamp`, newest first.
    fn recent_acks(&self, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// All ACKs of a batch, ordered by `timestamp`.
    fn acks_by_batch(&self, batch_id: &str) -> Result<Vec<LedgerEntry>>;

    /// All ACKs from a node, ordered by `timestamp`.
    fn acks_by_node(&self, node_id: &str) -> Result<Vec<LedgerEntry>>;

    /// ACKs with `timestamp > since`, oldest first, at most `limit`.
    fn acks_since(&self, since: i64, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Every ACK, ordered by `timestamp`.
    fn all_acks(&self) -> Result<Vec<LedgerEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Statistics
    // ─────────────────────────────────────────────────────────────────────────

    fn counts(&self) -> Result<LedgerCounts>;

    /// Largest `created_at`, or `None` when empty.
    fn last_created_at(&self) -> Result<Option<i64>>;

    /// Bytes used by the backing storage. 0 when not file-backed.
    fn storage_size_bytes(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Reclaim free space.
    fn vacuum(&self) -> Result<()>;

    /// Delete every ACK. Returns the number removed.
    fn clear(&self) -> Result<usize>;

    /// Release the backing storage.
    fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}
