//! Nonce store: single-use tokens that defeat replay.
//!
//! A recorded nonce must never be reported unseen again before its TTL
//! expires. [`NonceStore::check_and_record`] is the operation the verifier
//! uses; implementations that can do it atomically should override it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

/// Replay protection collaborator.
pub trait NonceStore: Send + Sync {
    /// Whether `nonce` was recorded and has not yet expired.
    fn seen(&self, nonce: &str) -> bool;

    /// Record `nonce` as used for `ttl`.
    fn record(&self, nonce: &str, ttl: Duration);

    /// Record `nonce` if unseen. Returns `true` when the nonce was fresh.
    fn check_and_record(&self, nonce: &str, ttl: Duration) -> bool {
        if self.seen(nonce) {
            return false;
        }
        self.record(nonce, ttl);
        true
    }

    /// Drop expired entries. Returns how many were removed.
    fn purge_expired(&self) -> usize;
}

/// In-process nonce store keyed by nonce, holding expiry times.
pub struct MemoryNonceStore {
    entries: Mutex<HashMap<String, i64>>,
    clock: Arc<dyn Clock>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock
            .now_millis()
            .saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
    }
}

impl Default for MemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceStore for MemoryNonceStore {
    fn seen(&self, nonce: &str) -> bool {
        let now = self.clock.now_millis();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(nonce)
            .is_some_and(|expires_at| *expires_at > now)
    }

    fn record(&self, nonce: &str, ttl: Duration) {
        let expires_at = self.expiry(ttl);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(nonce.to_string(), expires_at);
    }

    fn check_and_record(&self, nonce: &str, ttl: Duration) -> bool {
        let now = self.clock.now_millis();
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(nonce) {
            Some(existing) if *existing > now => false,
            _ => {
                entries.insert(nonce.to_string(), expires_at);
                true
            }
        }
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }
}

impl std::fmt::Debug for MemoryNonceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNonceStore")
            .field("entries", &self.len())
            .finish()
    }
}
