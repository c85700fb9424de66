//! Test fixtures and helpers.
//!
//! A fixture pins the clock, so freshness checks are deterministic, and
//! shares one nonce store and health tracker across every verifier it
//! hands out.

use std::path::Path;
use std::sync::Arc;

use fedack::{DeploymentMode, Federation, FederationConfig};
use fedack_core::{
    AckBuilder, AckVerifier, FederationAck, ManualClock, MemoryNonceStore, SharedKey, SkewTracker,
};
use fedack_store::MemoryAckStore;
use serde_json::Value;

/// 2025-01-14T16:00:00Z
pub const FIXED_NOW: i64 = 1_736_870_400_000;

/// Key, clock and collaborators for one node.
pub struct AckFixture {
    pub node_id: String,
    pub key: SharedKey,
    pub clock: Arc<ManualClock>,
    pub nonces: Arc<MemoryNonceStore>,
    pub health: Arc<SkewTracker>,
}

impl AckFixture {
    /// Node `atlas-local` with a random key, clock at [`FIXED_NOW`].
    pub fn new() -> Self {
        Self::with_key("atlas-local", SharedKey::generate())
    }

    pub fn with_key(node_id: impl Into<String>, key: SharedKey) -> Self {
        let clock = Arc::new(ManualClock::new(FIXED_NOW));
        Self {
            node_id: node_id.into(),
            key,
            nonces: Arc::new(MemoryNonceStore::with_clock(clock.clone())),
            health: Arc::new(SkewTracker::with_clock(clock.clone())),
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        use fedack_core::Clock;
        self.clock.now_millis()
    }

    /// A verifier sharing this fixture's key, clock and nonce store.
    pub fn verifier(&self) -> AckVerifier {
        AckVerifier::new(self.key.clone(), self.nonces.clone(), self.health.clone())
            .with_clock(self.clock.clone())
    }

    /// A signed ACK stamped with the fixture clock.
    pub fn make_ack(&self, event_type: &str, payload: Value) -> FederationAck {
        self.builder(event_type).payload(payload).sign(&self.key)
    }

    /// A signed ACK linked to `prev`.
    pub fn make_linked(
        &self,
        prev: &FederationAck,
        event_type: &str,
        payload: Value,
    ) -> FederationAck {
        self.builder(event_type)
            .payload(payload)
            .prev(prev.signature.clone())
            .sign(&self.key)
    }

    /// `len` linked ACKs, one second apart, the last stamped now.
    pub fn make_chain(&self, len: usize) -> Vec<FederationAck> {
        let start = self.now() - (len.saturating_sub(1) as i64) * 1_000;
        let mut chain: Vec<FederationAck> = Vec::with_capacity(len);
        for i in 0..len {
            let ack = AckBuilder::new(self.node_id.clone(), "chain.step")
                .timestamp(start + i as i64 * 1_000)
                .payload(serde_json::json!({ "step": i }))
                .prev_opt(chain.last().map(|p| p.signature.clone()))
                .sign(&self.key);
            chain.push(ack);
        }
        chain
    }

    /// An empty in-memory ledger on the fixture clock.
    pub fn ledger(&self) -> MemoryAckStore {
        MemoryAckStore::with_clock(self.clock.clone())
    }

    /// A production-mode node over an in-memory ledger, exporting to `dir`.
    pub fn federation(&self, dir: &Path) -> Federation<MemoryAckStore> {
        let config = FederationConfig {
            mode: DeploymentMode::Production,
            node_id: self.node_id.clone(),
            data_dir: dir.to_path_buf(),
            shared_key: Some(self.key.clone()),
            ..FederationConfig::default()
        };
        Federation::new(&config, self.ledger(), self.nonces.clone(), self.clock.clone())
            .expect("fixture config carries a key")
    }

    fn builder(&self, event_type: &str) -> AckBuilder {
        AckBuilder::new(self.node_id.clone(), event_type).timestamp(self.now())
    }
}

impl Default for AckFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` nodes (`node-0`, `node-1`, ...) sharing one federation key.
pub fn multi_node_fixtures(count: usize) -> Vec<AckFixture> {
    let key = SharedKey::generate();
    (0..count)
        .map(|i| AckFixture::with_key(format!("node-{i}"), key.clone()))
        .collect()
}
