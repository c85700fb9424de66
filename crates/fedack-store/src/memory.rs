//! In-memory implementation of the AckStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use fedack_core::{Clock, FederationAck, LedgerEntry, SystemClock};

use crate::error::Result;
use crate::traits::{AckStore, InsertResult, LedgerCounts};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryAckStore {
    inner: RwLock<MemoryStoreInner>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Entries in insertion order.
    entries: Vec<LedgerEntry>,

    /// event_id -> position in `entries`.
    by_id: HashMap<String, usize>,
}

impl MemoryStoreInner {
    /// Entries matching `filter`, ordered by timestamp then insertion.
    fn sorted<F>(&self, filter: F) -> Vec<LedgerEntry>
    where
        F: Fn(&LedgerEntry) -> bool,
    {
        let mut out: Vec<LedgerEntry> =
            self.entries.iter().filter(|e| filter(e)).cloned().collect();
        out.sort_by_key(|e| e.ack.timestamp);
        out
    }
}

impl MemoryAckStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            clock,
        }
    }
}

impl Default for MemoryAckStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AckStore for MemoryAckStore {
    fn insert_ack(&self, ack: &FederationAck, batch_id: &str) -> Result<InsertResult> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.by_id.contains_key(&ack.event_id) {
            return Ok(InsertResult::AlreadyExists);
        }

        let position = inner.entries.len();
        inner.entries.push(LedgerEntry {
            ack: ack.clone(),
            batch_id: batch_id.to_string(),
            created_at: self.clock.now_millis(),
        });
        inner.by_id.insert(ack.event_id.clone(), position);

        Ok(InsertResult::Inserted)
    }

    fn has_ack(&self, event_id: &str) -> Result<bool> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.by_id.contains_key(event_id))
    }

    fn get_ack(&self, event_id: &str) -> Result<Option<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .by_id
            .get(event_id)
            .map(|&position| inner.entries[position].clone()))
    }

    fn recent_acks(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut all = inner.sorted(|_| true);
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    fn acks_by_batch(&self, batch_id: &str) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.sorted(|e| e.batch_id == batch_id))
    }

    fn acks_by_node(&self, node_id: &str) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.sorted(|e| e.ack.node_id == node_id))
    }

    fn acks_since(&self, since: i64, limit: usize) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = inner.sorted(|e| e.ack.timestamp > since);
        out.truncate(limit);
        Ok(out)
    }

    fn all_acks(&self) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.sorted(|_| true))
    }

    fn counts(&self) -> Result<LedgerCounts> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let entries = &inner.entries;

        let batches: BTreeSet<&str> = entries.iter().map(|e| e.batch_id.as_str()).collect();
        let nodes: BTreeSet<&str> = entries.iter().map(|e| e.ack.node_id.as_str()).collect();

        Ok(LedgerCounts {
            total_acks: entries.len() as u64,
            unique_batches: batches.len() as u64,
            unique_nodes: nodes.len() as u64,
            oldest_ack_timestamp: entries.iter().map(|e| e.ack.timestamp).min().unwrap_or(0),
            newest_ack_timestamp: entries.iter().map(|e| e.ack.timestamp).max().unwrap_or(0),
        })
    }

    fn last_created_at(&self) -> Result<Option<i64>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.entries.iter().map(|e| e.created_at).max())
    }

    fn storage_size_bytes(&self) -> Result<u64> {
        Ok(0)
    }

    fn vacuum(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.shrink_to_fit();
        inner.by_id.shrink_to_fit();
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.entries.len();
        *inner = MemoryStoreInner::default();
        Ok(removed)
    }
}

impl std::fmt::Debug for MemoryAckStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MemoryAckStore")
            .field("entries", &inner.entries.len())
            .finish()
    }
}
