//! Identifier formats.
//!
//! - `event_id`: `ack-<uuid>`, the ledger primary key
//! - `batch_id`: `batch-<uuid>`, groups ACKs ingested together
//! - `nonce`: a plain UUID v4, single-use
//!
//! Only the hyphenated UUID form is accepted, in either case.

use uuid::{Uuid, Variant};

use crate::error::CoreError;

/// Prefix of every event id.
pub const EVENT_ID_PREFIX: &str = "ack-";

/// Prefix of every batch id.
pub const BATCH_ID_PREFIX: &str = "batch-";

/// Length of a hyphenated UUID.
const HYPHENATED_LEN: usize = 36;

/// Generate a fresh event id (`ack-<uuid-v4>`).
pub fn generate_event_id() -> String {
    format!("{EVENT_ID_PREFIX}{}", Uuid::new_v4())
}

/// Generate a fresh batch id (`batch-<uuid-v4>`).
pub fn generate_batch_id() -> String {
    format!("{BATCH_ID_PREFIX}{}", Uuid::new_v4())
}

/// Generate a fresh nonce (UUID v4).
pub fn generate_nonce() -> String {
    Uuid::new_v4().to_string()
}

/// Check an event id has the `ack-<uuid>` shape.
pub fn is_valid_event_id(event_id: &str) -> bool {
    event_id
        .strip_prefix(EVENT_ID_PREFIX)
        .and_then(parse_hyphenated)
        .is_some()
}

/// Check a batch id has the `batch-<uuid>` shape.
pub fn is_valid_batch_id(batch_id: &str) -> bool {
    batch_id
        .strip_prefix(BATCH_ID_PREFIX)
        .and_then(parse_hyphenated)
        .is_some()
}

/// Check a nonce is a hyphenated RFC 4122 version-4 UUID.
pub fn is_valid_nonce(nonce: &str) -> bool {
    parse_hyphenated(nonce)
        .map(|u| u.get_version_num() == 4 && u.get_variant() == Variant::RFC4122)
        .unwrap_or(false)
}

/// Return the batch id unchanged if it is well formed.
pub fn parse_batch_id(batch_id: &str) -> Result<&str, CoreError> {
    if is_valid_batch_id(batch_id) {
        Ok(batch_id)
    } else {
        Err(CoreError::InvalidBatchId(batch_id.to_string()))
    }
}

fn parse_hyphenated(s: &str) -> Option<Uuid> {
    // Uuid::parse_str also takes the simple, braced and urn forms.
    if s.len() != HYPHENATED_LEN {
        return None;
    }
    Uuid::parse_str(s).ok()
}
