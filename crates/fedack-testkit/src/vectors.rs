//! Golden test vectors for deterministic signing.
//!
//! Every federation node, whatever it is written in, must produce these
//! exact canonical strings and signatures. The expected values were
//! computed with an independent HMAC-SHA256 implementation over
//! sorted-key compact JSON.

use fedack_core::{FederationAck, UnsignedAck};
use serde_json::Value;

/// Shared secret used by every vector.
pub const GOLDEN_KEY: &str = "federation-golden-key";

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub event_id: &'static str,
    pub event_type: &'static str,
    pub timestamp: i64,
    pub nonce: &'static str,
    pub node_id: &'static str,
    /// Payload as JSON text, in arbitrary key order.
    pub payload_json: &'static str,
    pub prev_signature: Option<&'static str>,
    /// Expected canonical form.
    pub expected_canonical: &'static str,
    /// Expected hex HMAC-SHA256 under [`GOLDEN_KEY`].
    pub expected_signature: &'static str,
}

impl GoldenVector {
    /// Parsed payload. Vector payloads are fixed, valid JSON.
    pub fn payload(&self) -> Value {
        serde_json::from_str(self.payload_json).expect("golden payload is valid JSON")
    }

    pub fn unsigned(&self) -> UnsignedAck {
        UnsignedAck {
            event_id: self.event_id.to_string(),
            event_type: self.event_type.to_string(),
            timestamp: self.timestamp,
            nonce: self.nonce.to_string(),
            node_id: self.node_id.to_string(),
            payload: self.payload(),
            prev_signature: self.prev_signature.map(String::from),
        }
    }

    /// The ACK as a peer would send it, carrying the expected signature.
    pub fn signed(&self) -> FederationAck {
        let unsigned = self.unsigned();
        FederationAck {
            event_id: unsigned.event_id,
            event_type: unsigned.event_type,
            timestamp: unsigned.timestamp,
            nonce: unsigned.nonce,
            node_id: unsigned.node_id,
            payload: unsigned.payload,
            signature: self.expected_signature.to_string(),
            prev_signature: unsigned.prev_signature,
        }
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "root ack",
            event_id: "ack-0b1f6a52-8c1d-4a8e-9d4f-2f6f0e7c9a11",
            event_type: "payment.recovered",
            timestamp: 1736870400000,
            nonce: "3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            node_id: "atlas-local",
            payload_json: r#"{"currency":"USD","amount":120}"#,
            prev_signature: None,
            expected_canonical: r#"{"node_id":"atlas-local","nonce":"3f2504e0-4f89-41d3-9a0c-0305e82c3301","payload":{"amount":120,"currency":"USD"},"prev_signature":null,"timestamp":1736870400000,"type":"payment.recovered"}"#,
            expected_signature: "67fe51fe807e7db9f1f18ee9891124c5bc5593ea99f87d3e404f2651912f6950",
        },
        GoldenVector {
            name: "linked ack with nested payload",
            event_id: "ack-5d0c3c55-3c3e-4b51-a1a4-7f1b0b9d6e22",
            event_type: "invoice.settled",
            timestamp: 1736870401000,
            nonce: "9b2c6d1e-3a4f-4c5b-8d7e-1f0a2b3c4d5e",
            node_id: "atlas-local",
            payload_json: r#"{"invoice":{"lines":[{"sku":"b","qty":2},{"sku":"a","qty":1}],"id":"inv-7"}}"#,
            prev_signature: Some("67fe51fe807e7db9f1f18ee9891124c5bc5593ea99f87d3e404f2651912f6950"),
            expected_canonical: r#"{"node_id":"atlas-local","nonce":"9b2c6d1e-3a4f-4c5b-8d7e-1f0a2b3c4d5e","payload":{"invoice":{"id":"inv-7","lines":[{"qty":2,"sku":"b"},{"qty":1,"sku":"a"}]}},"prev_signature":"67fe51fe807e7db9f1f18ee9891124c5bc5593ea99f87d3e404f2651912f6950","timestamp":1736870401000,"type":"invoice.settled"}"#,
            expected_signature: "f8882e26741646992bcb39383903e546ae80410f17bb7339b0191f578f225bc7",
        },
        GoldenVector {
            name: "non-ascii text, null and fraction",
            event_id: "ack-8e2d1f9a-0b7c-4d3e-b5a6-3c4d5e6f7a33",
            event_type: "note.added",
            timestamp: 1736870402000,
            nonce: "c56a4180-65aa-42ec-a945-5fd21dec0538",
            node_id: "tower-1",
            payload_json: r#"{"ratio":0.5,"note":"café ✓","empty":null}"#,
            prev_signature: None,
            expected_canonical: r#"{"node_id":"tower-1","nonce":"c56a4180-65aa-42ec-a945-5fd21dec0538","payload":{"empty":null,"note":"café ✓","ratio":0.5},"prev_signature":null,"timestamp":1736870402000,"type":"note.added"}"#,
            expected_signature: "d7d204196cb2e32e9f6c67d968862beb11da4674ee10e7eb990660bb1d88506f",
        },
        GoldenVector {
            name: "empty payload at epoch",
            event_id: "ack-1a2b3c4d-5e6f-4a7b-8c9d-0e1f2a3b4c44",
            event_type: "heartbeat",
            timestamp: 0,
            nonce: "16fd2706-8baf-433b-82eb-8c7fada847da",
            node_id: "atlas-local",
            payload_json: "{}",
            prev_signature: None,
            expected_canonical: r#"{"node_id":"atlas-local","nonce":"16fd2706-8baf-433b-82eb-8c7fada847da","payload":{},"prev_signature":null,"timestamp":0,"type":"heartbeat"}"#,
            expected_signature: "b41b8a4eb952f35598e8bb83a3f953dcbedc3c680158868775bd058d2bf40e34",
        },
    ]
}

/// Check every vector. Returns `(name, passed, detail)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let key = fedack_core::SharedKey::from_static(GOLDEN_KEY);

    all_vectors()
        .into_iter()
        .map(|v| {
            let unsigned = v.unsigned();
            let canonical = unsigned.canonical();
            if canonical != v.expected_canonical {
                return (v.name.to_string(), false, format!("canonical: {canonical}"));
            }
            let signed = unsigned.sign(&key);
            if signed.signature != v.expected_signature {
                return (
                    v.name.to_string(),
                    false,
                    format!("signature: {}", signed.signature),
                );
            }
            (v.name.to_string(), true, String::new())
        })
        .collect()
}
