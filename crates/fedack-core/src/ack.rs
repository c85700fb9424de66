//! ACK: the signed unit of trust exchanged between federation nodes.
//!
//! An ACK asserts that `node_id` observed an event of `event_type` at
//! `timestamp`. It is immutable once signed; any change to a signable field
//! invalidates `signature`. `prev_signature` links it to the preceding ACK
//! of the same lineage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonical_ack;
use crate::crypto::SharedKey;
use crate::error::CoreError;
use crate::types::{generate_event_id, generate_nonce, is_valid_event_id, is_valid_nonce};

/// Borrowed view of the fields covered by the signature.
///
/// Excludes `event_id` and `signature`.
#[derive(Debug, Clone, Copy)]
pub struct Signable<'a> {
    pub event_type: &'a str,
    pub timestamp: i64,
    pub payload: &'a Value,
    pub prev_signature: Option<&'a str>,
    pub node_id: &'a str,
    pub nonce: &'a str,
}

/// An ACK before signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedAck {
    pub event_id: String,
    pub event_type: String,
    /// Origin wall-clock time, Unix ms.
    pub timestamp: i64,
    pub nonce: String,
    pub node_id: String,
    pub payload: Value,
    #[serde(default)]
    pub prev_signature: Option<String>,
}

impl UnsignedAck {
    pub fn signable(&self) -> Signable<'_> {
        Signable {
            event_type: &self.event_type,
            timestamp: self.timestamp,
            payload: &self.payload,
            prev_signature: self.prev_signature.as_deref(),
            node_id: &self.node_id,
            nonce: &self.nonce,
        }
    }

    /// Canonical form of the signable fields.
    pub fn canonical(&self) -> String {
        canonical_ack(&self.signable())
    }

    /// Sign with HMAC-SHA256 and attach the hex signature.
    pub fn sign(self, key: &SharedKey) -> FederationAck {
        let signature = key.sign_hex(self.canonical().as_bytes());
        FederationAck {
            event_id: self.event_id,
            event_type: self.event_type,
            timestamp: self.timestamp,
            nonce: self.nonce,
            node_id: self.node_id,
            payload: self.payload,
            signature,
            prev_signature: self.prev_signature,
        }
    }
}

/// A signed ACK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationAck {
    /// `ack-<uuid>`; the ledger primary key.
    pub event_id: String,
    pub event_type: String,
    /// Origin wall-clock time, Unix ms.
    pub timestamp: i64,
    /// Single-use UUID v4.
    pub nonce: String,
    pub node_id: String,
    pub payload: Value,
    /// Lowercase hex HMAC-SHA256 over the canonical form.
    pub signature: String,
    /// Signature of the preceding ACK in the same lineage.
    #[serde(default)]
    pub prev_signature: Option<String>,
}

impl FederationAck {
    pub fn signable(&self) -> Signable<'_> {
        Signable {
            event_type: &self.event_type,
            timestamp: self.timestamp,
            payload: &self.payload,
            prev_signature: self.prev_signature.as_deref(),
            node_id: &self.node_id,
            nonce: &self.nonce,
        }
    }

    /// Canonical form of the signable fields.
    pub fn canonical(&self) -> String {
        canonical_ack(&self.signable())
    }

    /// The `prev_signature` link, treating an empty string as absent.
    pub fn prev_link(&self) -> Option<&str> {
        self.prev_signature.as_deref().filter(|s| !s.is_empty())
    }

    /// Check `event_id` and `nonce` formats.
    pub fn validate_ids(&self) -> Result<(), CoreError> {
        if !is_valid_event_id(&self.event_id) {
            return Err(CoreError::InvalidEventId(self.event_id.clone()));
        }
        if !is_valid_nonce(&self.nonce) {
            return Err(CoreError::InvalidNonce(self.nonce.clone()));
        }
        Ok(())
    }
}

/// An ACK as persisted in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub ack: FederationAck,
    /// `batch-<uuid>` of the ingest that stored this ACK.
    pub batch_id: String,
    /// Local ingest time, Unix ms. Distinct from `ack.timestamp`.
    pub created_at: i64,
}

/// Builder for ACKs.
///
/// Event id and nonce are generated unless supplied.
#[derive(Debug, Clone)]
pub struct AckBuilder {
    node_id: String,
    event_type: String,
    event_id: Option<String>,
    nonce: Option<String>,
    timestamp: i64,
    payload: Value,
    prev_signature: Option<String>,
}

impl AckBuilder {
    pub fn new(node_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            event_type: event_type.into(),
            event_id: None,
            nonce: None,
            timestamp: 0,
            payload: Value::Null,
            prev_signature: None,
        }
    }

    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Link to the previous ACK of this lineage.
    pub fn prev(mut self, prev_signature: impl Into<String>) -> Self {
        self.prev_signature = Some(prev_signature.into());
        self
    }

    /// Link to `prev` if present.
    pub fn prev_opt(mut self, prev_signature: Option<String>) -> Self {
        self.prev_signature = prev_signature;
        self
    }

    pub fn build(self) -> UnsignedAck {
        UnsignedAck {
            event_id: self.event_id.unwrap_or_else(generate_event_id),
            event_type: self.event_type,
            timestamp: self.timestamp,
            nonce: self.nonce.unwrap_or_else(generate_nonce),
            node_id: self.node_id,
            payload: self.payload,
            prev_signature: self.prev_signature,
        }
    }

    pub fn sign(self, key: &SharedKey) -> FederationAck {
        self.build().sign(key)
    }
}
