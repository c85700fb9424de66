//! Wire-level vectors for cross-implementation verification.
//!
//! Each vector is an ACK exactly as a peer puts it on the wire, signed by
//! an independent HMAC-SHA256 implementation over sorted-key compact JSON.
//! Every node must accept these bytes and reproduce the canonical string.

use std::sync::Arc;

use fedack::core::{canonical_json, verify_signature, ManualClock, MemoryNonceStore};
use fedack::{
    AckBatch, BatchStatus, DeploymentMode, Federation, FederationAck, FederationConfig,
    MemoryAckStore, SharedKey, VerifyError,
};
use serde::Deserialize;
use serde_json::Value;

const KEY: &str = "federation-golden-key";

#[derive(Debug, Deserialize)]
struct WireVector {
    name: String,
    ack: Value,
    canonical: String,
}

fn vectors() -> Vec<WireVector> {
    serde_json::from_str(
        r#"[
  {
    "name": "root ack",
    "ack": {
      "event_id": "ack-0b1f6a52-8c1d-4a8e-9d4f-2f6f0e7c9a11",
      "event_type": "payment.recovered",
      "timestamp": 1736870400000,
      "nonce": "3f2504e0-4f89-41d3-9a0c-0305e82c3301",
      "node_id": "atlas-local",
      "payload": {"currency": "USD", "amount": 120},
      "signature": "67fe51fe807e7db9f1f18ee9891124c5bc5593ea99f87d3e404f2651912f6950"
    },
    "canonical": "{\"node_id\":\"atlas-local\",\"nonce\":\"3f2504e0-4f89-41d3-9a0c-0305e82c3301\",\"payload\":{\"amount\":120,\"currency\":\"USD\"},\"prev_signature\":null,\"timestamp\":1736870400000,\"type\":\"payment.recovered\"}"
  },
  {
    "name": "linked ack with nested payload",
    "ack": {
      "event_id": "ack-5d0c3c55-3c3e-4b51-a1a4-7f1b0b9d6e22",
      "event_type": "invoice.settled",
      "timestamp": 1736870401000,
      "nonce": "9b2c6d1e-3a4f-4c5b-8d7e-1f0a2b3c4d5e",
      "node_id": "atlas-local",
      "payload": {"invoice": {"lines": [{"sku": "b", "qty": 2}, {"sku": "a", "qty": 1}], "id": "inv-7"}},
      "signature": "f8882e26741646992bcb39383903e546ae80410f17bb7339b0191f578f225bc7",
      "prev_signature": "67fe51fe807e7db9f1f18ee9891124c5bc5593ea99f87d3e404f2651912f6950"
    },
    "canonical": "{\"node_id\":\"atlas-local\",\"nonce\":\"9b2c6d1e-3a4f-4c5b-8d7e-1f0a2b3c4d5e\",\"payload\":{\"invoice\":{\"id\":\"inv-7\",\"lines\":[{\"qty\":2,\"sku\":\"b\"},{\"qty\":1,\"sku\":\"a\"}]}},\"prev_signature\":\"67fe51fe807e7db9f1f18ee9891124c5bc5593ea99f87d3e404f2651912f6950\",\"timestamp\":1736870401000,\"type\":\"invoice.settled\"}"
  },
  {
    "name": "non-ascii text, null and fraction",
    "ack": {
      "event_id": "ack-8e2d1f9a-0b7c-4d3e-b5a6-3c4d5e6f7a33",
      "event_type": "note.added",
      "timestamp": 1736870402000,
      "nonce": "c56a4180-65aa-42ec-a945-5fd21dec0538",
      "node_id": "tower-1",
      "payload": {"ratio": 0.5, "note": "café ✓", "empty": null},
      "signature": "d7d204196cb2e32e9f6c67d968862beb11da4674ee10e7eb990660bb1d88506f",
      "prev_signature": null
    },
    "canonical": "{\"node_id\":\"tower-1\",\"nonce\":\"c56a4180-65aa-42ec-a945-5fd21dec0538\",\"payload\":{\"empty\":null,\"note\":\"café ✓\",\"ratio\":0.5},\"prev_signature\":null,\"timestamp\":1736870402000,\"type\":\"note.added\"}"
  }
]"#,
    )
    .unwrap()
}

fn parse(vector: &WireVector) -> FederationAck {
    serde_json::from_value(vector.ack.clone()).unwrap()
}

#[test]
fn test_wire_vectors_canonicalize() {
    for vector in vectors() {
        assert_eq!(parse(&vector).canonical(), vector.canonical, "{}", vector.name);
    }
}

#[test]
fn test_wire_vectors_verify() {
    let key = SharedKey::from_static(KEY);
    for vector in vectors() {
        assert!(verify_signature(&parse(&vector), &key).is_ok(), "{}", vector.name);
    }
}

#[test]
fn test_wire_vectors_reject_other_key() {
    let key = SharedKey::from_static("not-the-golden-key");
    for vector in vectors() {
        assert_eq!(
            verify_signature(&parse(&vector), &key),
            Err(VerifyError::SignatureMismatch),
            "{}",
            vector.name
        );
    }
}

#[test]
fn test_unicode_escapes_do_not_change_canonical_form() {
    let vector = &vectors()[2];
    let ack = parse(vector);
    assert_eq!(ack.payload["note"], Value::String("café ✓".into()));
    assert!(canonical_json(&ack.payload).contains("café ✓"));
}

#[test]
fn test_wire_vectors_ingest_as_chain() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_736_870_402_000));
    let config = FederationConfig {
        mode: DeploymentMode::Production,
        shared_key: Some(SharedKey::from_static(KEY)),
        data_dir: dir.path().to_path_buf(),
        ..FederationConfig::default()
    };
    let federation = Federation::new(
        &config,
        MemoryAckStore::with_clock(clock.clone()),
        Arc::new(MemoryNonceStore::with_clock(clock.clone())),
        clock,
    )
    .unwrap();

    let batch = AckBatch {
        batch_id: "batch-6f1c2a3b-4d5e-4f60-8a7b-9c0d1e2f3a4b".into(),
        node_id: "atlas-local".into(),
        items: vectors().iter().map(parse).collect(),
        request_timestamp: None,
    };
    let report = federation.ingest_batch(&batch).unwrap();
    assert_eq!(report.status, BatchStatus::Ok);
    assert_eq!(report.received, 3);

    let lineage = federation.audit_node_lineage("atlas-local").unwrap();
    assert!(lineage.valid, "{:?}", lineage.error);
    assert_eq!(federation.acks_by_node("atlas-local").unwrap().len(), 2);
}
