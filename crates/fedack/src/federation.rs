//! The Federation: unified API for federated ACKs.
//!
//! Brings together signing, verification, the ledger and its export into
//! one object, constructed once at startup and passed to whoever needs it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use fedack_core::{
    audit_chain, is_valid_event_id, parse_batch_id, verify_ack_chain, AckBuilder,
    AckVerifier, ChainVerification, Clock, FederationAck, HealthMetrics, HealthTracker,
    LedgerEntry, NonceStore, SharedKey, SkewTracker, SystemClock, UnsignedAck, VerificationResult,
    VerifyError, VerifyOptions,
};
use fedack_store::{
    AckStore, ExportReport, InsertResult, JsonlExporter, SqliteAckStore, SqliteNonceStore,
};

use crate::config::FederationConfig;
use crate::error::{FederationError, Result};

/// Most ACKs accepted in one batch.
pub const MAX_ITEMS_PER_BATCH: usize = 100;

/// Outcome of ingesting one ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Verified and stored.
    Inserted,
    /// Already in the ledger. Nothing was verified or consumed.
    Duplicate,
    /// Refused; nothing was stored.
    Rejected(RejectReason),
}

/// Why an ACK was refused at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidEventId,
    Verification(VerifyError),
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InvalidEventId => "invalid_event_id",
            RejectReason::Verification(e) => e.code(),
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A set of ACKs delivered together by a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckBatch {
    pub batch_id: String,
    /// Sending node.
    pub node_id: String,
    pub items: Vec<FederationAck>,
    /// Sender's clock when the batch was sent, Unix ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Received,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    pub event_id: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// No item errored.
    Ok,
    /// Some items errored.
    Partial,
    /// Every item errored.
    Error,
}

/// Per-batch ingest summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub batch_id: String,
    pub received: usize,
    pub skipped: usize,
    pub errors: usize,
    /// `request_timestamp - now`, 0 when the sender gave no timestamp.
    pub clock_skew_ms: i64,
    pub details: Vec<ItemReport>,
    /// Whether the JSONL export was refreshed after this batch.
    pub exported: bool,
}

/// Aggregate view of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_acks: u64,
    pub unique_batches: u64,
    pub unique_nodes: u64,
    pub oldest_ack_timestamp: i64,
    pub newest_ack_timestamp: i64,
    pub db_size_bytes: u64,
    pub jsonl_size_bytes: u64,
}

/// The main Federation struct.
///
/// Provides a unified API for:
/// - Creating and signing ACKs
/// - Verifying single ACKs and chains
/// - Ingesting ACKs and batches into the ledger
/// - Querying, auditing and exporting the ledger
pub struct Federation<S: AckStore> {
    node_id: String,
    key: SharedKey,
    verifier: AckVerifier,
    health: Arc<SkewTracker>,
    nonces: Arc<dyn NonceStore>,
    store: S,
    exporter: JsonlExporter,
    clock: Arc<dyn Clock>,
    allow_destructive_maintenance: bool,
}

impl Federation<SqliteAckStore> {
    /// Open the ledger and nonce store under `config.data_dir`.
    pub fn open(config: &FederationConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: &FederationConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        // Key first: a misconfigured node must not touch its data directory.
        let key = config.resolve_shared_key()?;

        std::fs::create_dir_all(&config.data_dir)?;
        let store = SqliteAckStore::open_with_clock(config.ledger_path(), clock.clone())?;
        let nonces = Arc::new(SqliteNonceStore::open_with_clock(
            config.nonce_store_path(),
            clock.clone(),
        )?);

        Ok(Self::assemble(config, key, store, nonces, clock))
    }
}

impl<S: AckStore> Federation<S> {
    /// Assemble a federation node from its parts.
    pub fn new(
        config: &FederationConfig,
        store: S,
        nonces: Arc<dyn NonceStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let key = config.resolve_shared_key()?;
        Ok(Self::assemble(config, key, store, nonces, clock))
    }

    fn assemble(
        config: &FederationConfig,
        key: SharedKey,
        store: S,
        nonces: Arc<dyn NonceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let health = Arc::new(SkewTracker::with_clock(clock.clone()));
        let verifier = AckVerifier::new(key.clone(), nonces.clone(), health.clone())
            .with_options(config.verify_options())
            .with_clock(clock.clone());
        let exporter = JsonlExporter::new(config.export_path())
            .with_rotate_bytes(config.export_rotate_bytes)
            .with_clock(clock.clone());

        info!(
            node_id = %config.node_id,
            mode = %config.mode,
            key = %key.fingerprint(),
            "federation node ready"
        );

        Self {
            node_id: config.node_id.clone(),
            key,
            verifier,
            health,
            nonces,
            store,
            exporter,
            clock,
            allow_destructive_maintenance: config.allow_destructive_maintenance,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn verifier(&self) -> &AckVerifier {
        &self.verifier
    }

    /// Smoothed clock skew across every verification so far.
    pub fn health(&self) -> HealthMetrics {
        self.health.metrics()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Signing
    // ─────────────────────────────────────────────────────────────────────────

    /// Create and sign a fresh ACK from this node, stamped now.
    pub fn create_ack(
        &self,
        event_type: &str,
        payload: Value,
        prev_signature: Option<String>,
    ) -> FederationAck {
        AckBuilder::new(self.node_id.clone(), event_type)
            .timestamp(self.clock.now_millis())
            .payload(payload)
            .prev_opt(prev_signature)
            .sign(&self.key)
    }

    pub fn sign(&self, ack: UnsignedAck) -> FederationAck {
        ack.sign(&self.key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Full verification. Consumes the ACK's nonce.
    pub fn verify(&self, ack: &FederationAck) -> VerificationResult {
        self.verifier.verify(ack)
    }

    pub fn verify_with(&self, ack: &FederationAck, options: &VerifyOptions) -> VerificationResult {
        self.verifier.verify_with(ack, options)
    }

    /// Full verification of every ACK plus lineage.
    pub fn verify_chain(&self, acks: &[FederationAck]) -> ChainVerification {
        verify_ack_chain(acks, &self.verifier)
    }

    /// Signature and lineage audit of a node's stored ACKs.
    pub fn audit_node_lineage(&self, node_id: &str) -> Result<ChainVerification> {
        let acks: Vec<FederationAck> = self
            .store
            .acks_by_node(node_id)?
            .into_iter()
            .map(|entry| entry.ack)
            .collect();
        let result = audit_chain(&acks, &self.key);
        if let Some(error) = &result.error {
            warn!(node_id, %error, "stored lineage failed audit");
        }
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingest
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify and store one ACK received from a peer.
    pub fn ingest(&self, ack: &FederationAck, batch_id: &str) -> Result<IngestOutcome> {
        let batch_id = parse_batch_id(batch_id)
            .map_err(|_| FederationError::InvalidBatchId(batch_id.to_string()))?;

        if !is_valid_event_id(&ack.event_id) {
            return Ok(IngestOutcome::Rejected(RejectReason::InvalidEventId));
        }

        if self.store.has_ack(&ack.event_id)? {
            return Ok(IngestOutcome::Duplicate);
        }

        let verification = self.verifier.verify(ack);
        if let Some(error) = verification.error {
            debug!(event_id = %ack.event_id, node_id = %ack.node_id, %error, "ack rejected");
            return Ok(IngestOutcome::Rejected(RejectReason::Verification(error)));
        }

        Ok(match self.store.insert_ack(ack, batch_id)? {
            InsertResult::Inserted => IngestOutcome::Inserted,
            InsertResult::AlreadyExists => IngestOutcome::Duplicate,
        })
    }

    /// Ingest a peer's batch, item by item.
    ///
    /// Refreshes the JSONL export when anything was received; an export
    /// failure is logged and reported, not raised, since the ACKs are
    /// already committed.
    pub fn ingest_batch(&self, batch: &AckBatch) -> Result<BatchReport> {
        parse_batch_id(&batch.batch_id)
            .map_err(|_| FederationError::InvalidBatchId(batch.batch_id.clone()))?;

        if batch.items.len() > MAX_ITEMS_PER_BATCH {
            return Err(FederationError::BatchTooLarge {
                actual: batch.items.len(),
                max: MAX_ITEMS_PER_BATCH,
            });
        }

        let clock_skew_ms = match batch.request_timestamp {
            Some(sent) => {
                let skew = sent.saturating_sub(self.clock.now_millis());
                self.health.record_clock_skew(skew);
                skew
            }
            None => 0,
        };

        let mut details = Vec::with_capacity(batch.items.len());
        let (mut received, mut skipped, mut errors) = (0, 0, 0);

        for ack in &batch.items {
            let (status, reason) = match self.ingest(ack, &batch.batch_id)? {
                IngestOutcome::Inserted => {
                    received += 1;
                    (ItemStatus::Received, None)
                }
                IngestOutcome::Duplicate => {
                    skipped += 1;
                    (ItemStatus::Skipped, Some("duplicate".to_string()))
                }
                IngestOutcome::Rejected(reason) => {
                    errors += 1;
                    (ItemStatus::Error, Some(reason.to_string()))
                }
            };
            details.push(ItemReport {
                event_id: ack.event_id.clone(),
                status,
                reason,
            });
        }

        let status = if errors == 0 {
            BatchStatus::Ok
        } else if errors < batch.items.len() {
            BatchStatus::Partial
        } else {
            BatchStatus::Error
        };

        let exported = received > 0
            && match self.export_jsonl() {
                Ok(_) => true,
                Err(e) => {
                    warn!(
                        batch_id = %batch.batch_id,
                        error = %e,
                        "ledger export after ingest failed"
                    );
                    false
                }
            };

        info!(
            batch_id = %batch.batch_id,
            from = %batch.node_id,
            received,
            skipped,
            errors,
            "ingested batch"
        );

        Ok(BatchReport {
            status,
            batch_id: batch.batch_id.clone(),
            received,
            skipped,
            errors,
            clock_skew_ms,
            details,
            exported,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Store without verification. `false` when the id already exists.
    pub fn insert_ack(&self, ack: &FederationAck, batch_id: &str) -> Result<bool> {
        Ok(self.store.insert_ack(ack, batch_id)?.is_inserted())
    }

    pub fn has_ack(&self, event_id: &str) -> Result<bool> {
        Ok(self.store.has_ack(event_id)?)
    }

    pub fn get_ack(&self, event_id: &str) -> Result<Option<LedgerEntry>> {
        Ok(self.store.get_ack(event_id)?)
    }

    pub fn recent_acks(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.recent_acks(limit)?)
    }

    pub fn acks_by_batch(&self, batch_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.acks_by_batch(batch_id)?)
    }

    pub fn acks_by_node(&self, node_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.acks_by_node(node_id)?)
    }

    pub fn acks_since(&self, since: i64, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.acks_since(since, limit)?)
    }

    /// A page of ACKs for a peer pulling from this node, capped at
    /// [`MAX_ITEMS_PER_BATCH`].
    pub fn outbound_page(&self, since: i64, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.acks_since(since, limit.min(MAX_ITEMS_PER_BATCH))
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let counts = self.store.counts()?;
        Ok(LedgerStats {
            total_acks: counts.total_acks,
            unique_batches: counts.unique_batches,
            unique_nodes: counts.unique_nodes,
            oldest_ack_timestamp: counts.oldest_ack_timestamp,
            newest_ack_timestamp: counts.newest_ack_timestamp,
            db_size_bytes: self.store.storage_size_bytes()?,
            jsonl_size_bytes: self.exporter.size_bytes()?,
        })
    }

    /// Whole seconds since the most recent ingest, `None` when empty.
    pub fn last_verified_ack_age(&self) -> Result<Option<u64>> {
        let now = self.clock.now_millis();
        Ok(self
            .store
            .last_created_at()?
            .map(|created_at| (now.saturating_sub(created_at).max(0) / 1_000) as u64))
    }

    pub fn export_jsonl(&self) -> Result<ExportReport> {
        Ok(self.exporter.export(&self.store)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Purge expired nonces, then compact the ledger.
    pub fn vacuum(&self) -> Result<()> {
        self.purge_expired_nonces();
        Ok(self.store.vacuum()?)
    }

    /// Drop nonces past their TTL. Returns how many were removed.
    pub fn purge_expired_nonces(&self) -> usize {
        let removed = self.nonces.purge_expired();
        debug!(removed, "purged expired nonces");
        removed
    }

    /// Delete every ACK. Refused unless destructive maintenance is enabled.
    pub fn clear(&self) -> Result<usize> {
        if !self.allow_destructive_maintenance {
            warn!("refused to clear ack ledger: destructive maintenance disabled");
            return Err(FederationError::MaintenanceDisabled);
        }
        Ok(self.store.clear()?)
    }

    /// Close the ledger.
    pub fn close(self) -> Result<()> {
        info!(node_id = %self.node_id, "closing federation node");
        Ok(self.store.close()?)
    }
}

impl<S: AckStore> std::fmt::Debug for Federation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("node_id", &self.node_id)
            .field("key", &self.key)
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}
