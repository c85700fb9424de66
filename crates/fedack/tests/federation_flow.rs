//! End-to-end flows over the SQLite ledger: ingest, query, export, audit.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use fedack::core::{generate_batch_id, ManualClock};
use fedack::store::SqliteNonceStore;
use fedack::{
    AckBatch, AckBuilder, BatchStatus, ConfigError, DeploymentMode, Federation, FederationAck,
    FederationConfig, FederationError, ItemStatus, LedgerEntry, SharedKey, SqliteAckStore,
};
use serde_json::json;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const NOW: i64 = 1_736_870_400_000;
const KEY: &str = "integration-federation-key";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(dir: &Path) -> FederationConfig {
    FederationConfig {
        mode: DeploymentMode::Production,
        node_id: "atlas-local".into(),
        data_dir: dir.to_path_buf(),
        shared_key: Some(SharedKey::from_static(KEY)),
        ..FederationConfig::default()
    }
}

fn open(config: &FederationConfig, clock: &Arc<ManualClock>) -> Result<Federation<SqliteAckStore>> {
    Ok(Federation::open_with_clock(config, clock.clone())?)
}

/// An ACK from a peer sharing the federation key.
fn peer_ack(node_id: &str, event_type: &str, timestamp: i64) -> FederationAck {
    AckBuilder::new(node_id, event_type)
        .timestamp(timestamp)
        .payload(json!({"source": node_id}))
        .sign(&SharedKey::from_static(KEY))
}

fn batch(node_id: &str, items: Vec<FederationAck>) -> AckBatch {
    AckBatch {
        batch_id: generate_batch_id(),
        node_id: node_id.into(),
        items,
        request_timestamp: None,
    }
}

fn read_jsonl(path: &Path) -> Result<Vec<LedgerEntry>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .map(|line| -> Result<LedgerEntry> { Ok(serde_json::from_str(line)?) })
        .collect()
}

#[test]
fn test_batch_statuses() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let federation = open(&config(dir.path()), &clock)?;

    let good = peer_ack("tower-1", "payment.recovered", NOW);
    let report = federation.ingest_batch(&batch("tower-1", vec![good.clone()]))?;
    assert_eq!(report.status, BatchStatus::Ok);
    assert_eq!(report.received, 1);
    assert!(report.exported);

    // Duplicate plus one tampered ACK.
    let mut tampered = peer_ack("tower-1", "payment.recovered", NOW);
    tampered.payload = json!({"source": "forged"});
    let report = federation.ingest_batch(&batch("tower-1", vec![good.clone(), tampered]))?;
    assert_eq!(report.status, BatchStatus::Partial);
    assert_eq!((report.received, report.skipped, report.errors), (0, 1, 1));
    assert_eq!(report.details[0].status, ItemStatus::Skipped);
    assert_eq!(report.details[0].reason.as_deref(), Some("duplicate"));
    assert_eq!(report.details[1].reason.as_deref(), Some("signature_mismatch"));
    assert!(!report.exported);

    let mut bad_id = peer_ack("tower-1", "t", NOW);
    bad_id.event_id = "event-1".into();
    let stale = peer_ack("tower-1", "t", NOW - 301_000);
    let report = federation.ingest_batch(&batch("tower-1", vec![bad_id, stale]))?;
    assert_eq!(report.status, BatchStatus::Error);
    assert_eq!(report.details[0].reason.as_deref(), Some("invalid_event_id"));
    assert_eq!(report.details[1].reason.as_deref(), Some("timestamp_expired"));

    assert_eq!(federation.stats()?.total_acks, 1);
    Ok(())
}

#[test]
fn test_invalid_batch_id_refused() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let federation = open(&config(dir.path()), &clock)?;

    let mut b = batch("tower-1", vec![peer_ack("tower-1", "t", NOW)]);
    b.batch_id = "batch-42".into();
    assert!(matches!(
        federation.ingest_batch(&b),
        Err(FederationError::InvalidBatchId(_))
    ));
    assert_eq!(federation.stats()?.total_acks, 0);
    Ok(())
}

#[test]
fn test_stats_and_export() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let config = config(dir.path());
    let federation = open(&config, &clock)?;

    let mut batch_ids = Vec::new();
    for (i, node) in ["tower-1", "tower-2", "tower-3"].iter().enumerate() {
        let items = (0..4)
            .map(|j| peer_ack(node, "t", NOW - 10_000 + (i * 4 + j) as i64))
            .collect();
        let b = batch(node, items);
        batch_ids.push(b.batch_id.clone());
        assert_eq!(federation.ingest_batch(&b)?.received, 4);
    }

    let stats = federation.stats()?;
    assert_eq!(stats.total_acks, 12);
    assert_eq!(stats.unique_batches, 3);
    assert_eq!(stats.unique_nodes, 3);
    assert_eq!(stats.oldest_ack_timestamp, NOW - 10_000);
    assert_eq!(stats.newest_ack_timestamp, NOW - 10_000 + 11);
    assert!(stats.db_size_bytes > 0);
    assert!(stats.jsonl_size_bytes > 0);

    let exported = read_jsonl(&config.export_path())?;
    assert_eq!(exported.len(), 12);
    assert!(exported.windows(2).all(|w| w[0].ack.timestamp <= w[1].ack.timestamp));
    assert_eq!(federation.acks_by_batch(&batch_ids[1])?.len(), 4);
    assert_eq!(federation.recent_acks(2)?[0].ack.timestamp, NOW - 10_000 + 11);
    assert_eq!(federation.outbound_page(NOW - 10_000 + 6, 500)?.len(), 5);

    clock.advance_millis(42_000);
    assert_eq!(federation.last_verified_ack_age()?, Some(42));
    Ok(())
}

#[test]
fn test_export_rotation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let config = FederationConfig {
        export_rotate_bytes: 64,
        ..config(dir.path())
    };
    let federation = open(&config, &clock)?;

    federation.ingest_batch(&batch("tower-1", vec![peer_ack("tower-1", "t", NOW)]))?;
    assert!(config.export_path().exists());

    clock.advance_millis(1_000);
    federation.ingest_batch(&batch("tower-1", vec![peer_ack("tower-1", "t", NOW + 1_000)]))?;

    let backups: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".bak"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(read_jsonl(&backups[0].path())?.len(), 1);
    assert_eq!(read_jsonl(&config.export_path())?.len(), 2);
    Ok(())
}

#[test]
fn test_node_lineage_audit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let federation = open(&config(dir.path()), &clock)?;

    let first = federation.create_ack("step", json!({"n": 1}), None);
    clock.advance_millis(1_000);
    let second = federation.create_ack("step", json!({"n": 2}), Some(first.signature.clone()));
    clock.advance_millis(1_000);
    let orphan = federation.create_ack("step", json!({"n": 3}), Some("00".repeat(32)));

    let b = batch("atlas-local", vec![first, second]);
    assert_eq!(federation.ingest_batch(&b)?.status, BatchStatus::Ok);
    assert!(federation.audit_node_lineage("atlas-local")?.valid);

    federation.ingest(&orphan, &b.batch_id)?;
    let audit = federation.audit_node_lineage("atlas-local")?;
    assert_eq!(
        audit.error.map(|e| e.to_string()).as_deref(),
        Some("lineage_break_at_2: prev_signature mismatch")
    );
    Ok(())
}

#[test]
fn test_production_refuses_without_key() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("node");
    let config = FederationConfig {
        shared_key: None,
        ..config(&data_dir)
    };
    let clock = Arc::new(ManualClock::new(NOW));

    assert!(matches!(
        open(&config, &clock).map_err(|e| e.downcast::<FederationError>()),
        Err(Ok(FederationError::Config(ConfigError::MissingKey)))
    ));
    assert!(!data_dir.exists());
}

#[test]
fn test_nonce_replay_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let config = config(dir.path());

    let original = peer_ack("tower-1", "t", NOW);
    let federation = open(&config, &clock)?;
    assert_eq!(federation.ingest_batch(&batch("tower-1", vec![original.clone()]))?.received, 1);
    federation.close()?;

    // Same signed content under a fresh event id.
    let mut replayed = original.clone();
    replayed.event_id = fedack::core::generate_event_id();

    let federation = open(&config, &clock)?;
    assert!(federation.has_ack(&original.event_id)?);
    let report = federation.ingest_batch(&batch("tower-1", vec![replayed]))?;
    assert_eq!(report.details[0].reason.as_deref(), Some("nonce_replay"));
    assert_eq!(federation.stats()?.total_acks, 1);
    federation.close()?;
    Ok(())
}

#[test]
fn test_request_timestamp_feeds_health() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let federation = open(&config(dir.path()), &clock)?;

    let mut b = batch("tower-1", vec![peer_ack("tower-1", "t", NOW)]);
    b.request_timestamp = Some(NOW + 45_000);
    let report = federation.ingest_batch(&b)?;
    assert_eq!(report.clock_skew_ms, 45_000);
    assert_eq!(federation.health().sample_count, 2);
    Ok(())
}

#[test]
fn test_vacuum_purges_durable_nonces() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let config = config(dir.path());
    let federation = open(&config, &clock)?;

    let items = (0..50).map(|i| peer_ack("tower-1", "t", NOW - i)).collect();
    assert_eq!(federation.ingest_batch(&batch("tower-1", items))?.received, 50);

    let nonces = SqliteNonceStore::open_with_clock(config.nonce_store_path(), clock.clone())?;
    assert_eq!(nonces.stats()?.active, 50);

    clock.advance_millis(10 * 24 * 60 * 60 * 1_000);
    federation.vacuum()?;

    let stats = nonces.stats()?;
    assert_eq!((stats.total, stats.expired), (0, 0));
    assert_eq!(federation.stats()?.total_acks, 50);
    Ok(())
}

#[test]
fn test_refused_clear_keeps_ledger() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(NOW));
    let config = config(dir.path());
    let federation = open(&config, &clock)?;
    federation.ingest_batch(&batch("tower-1", vec![peer_ack("tower-1", "t", NOW)]))?;

    assert!(matches!(federation.clear(), Err(FederationError::MaintenanceDisabled)));
    federation.close()?;

    let federation = open(&config, &clock)?;
    assert_eq!(federation.stats()?.total_acks, 1);
    Ok(())
}

/// Counts warn-level events.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_dev_fallback_key_warns_once_on_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = FederationConfig {
        mode: DeploymentMode::Development,
        shared_key: None,
        ..config(dir.path())
    };
    let clock = Arc::new(ManualClock::new(NOW));
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));

    let federation = tracing::subscriber::with_default(subscriber, || open(&config, &clock))?;
    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    assert_eq!(federation.stats()?.total_acks, 0);
    Ok(())
}
