//! Canonical JSON for signing.
//!
//! Signer and verifier (and any remote node validating the same ACK) must
//! produce byte-identical input to the HMAC. The canonical form is compact
//! JSON with:
//! - Object keys sorted lexicographically, at every nesting level
//! - No insignificant whitespace
//! - `prev_signature` always present, `null` when absent or empty
//!
//! The ACK's `event_type` is carried under the key `type`, which is what
//! the other federation nodes sign.
//!
//! **CRITICAL**: Changing this encoding invalidates every existing signature.

use serde_json::{Map, Value};

use crate::ack::Signable;

/// Canonical key names for the signable fields.
mod keys {
    pub const NODE_ID: &str = "node_id";
    pub const NONCE: &str = "nonce";
    pub const PAYLOAD: &str = "payload";
    pub const PREV_SIGNATURE: &str = "prev_signature";
    pub const TIMESTAMP: &str = "timestamp";
    pub const TYPE: &str = "type";
}

/// Canonical form of an ACK's signable fields.
pub fn canonical_ack(fields: &Signable<'_>) -> String {
    let prev = match fields.prev_signature {
        Some(sig) if !sig.is_empty() => Value::String(sig.to_string()),
        _ => Value::Null,
    };

    let mut map = Map::new();
    map.insert(keys::TYPE.into(), Value::String(fields.event_type.to_string()));
    map.insert(keys::TIMESTAMP.into(), Value::from(fields.timestamp));
    map.insert(keys::PAYLOAD.into(), fields.payload.clone());
    map.insert(keys::PREV_SIGNATURE.into(), prev);
    map.insert(keys::NODE_ID.into(), Value::String(fields.node_id.to_string()));
    map.insert(keys::NONCE.into(), Value::String(fields.nonce.to_string()));

    canonical_json(&Value::Object(map))
}

/// Encode any JSON value canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut buf = String::new();
    encode_value(&mut buf, value);
    buf
}

fn encode_value(buf: &mut String, value: &Value) {
    match value {
        Value::Object(map) => encode_object(buf, map),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                encode_value(buf, item);
            }
            buf.push(']');
        }
        // Scalars have a single compact rendering.
        scalar => buf.push_str(&scalar.to_string()),
    }
}

/// Objects are written with keys in sorted order regardless of how the
/// map was built.
fn encode_object(buf: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    buf.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        encode_str(buf, key);
        buf.push(':');
        encode_value(buf, value);
    }
    buf.push('}');
}

fn encode_str(buf: &mut String, s: &str) {
    buf.push_str(&Value::String(s.to_string()).to_string());
}
