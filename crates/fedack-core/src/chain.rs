//! Chain verification over an ordered set of ACKs.
//!
//! Two independent axes are checked after a stable sort by `timestamp`:
//! per-ACK validity and lineage continuity (`ack[i].prev_signature`, when
//! present, must equal `ack[i - 1].signature`). A divergent branch from the
//! same predecessor is reported as a lineage break.

use serde::Serialize;

use crate::ack::FederationAck;
use crate::crypto::SharedKey;
use crate::error::{ChainError, VerifyError};
use crate::verify::{verify_signature, AckVerifier};

/// Outcome of a chain check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ChainError>,
}

impl ChainVerification {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn broken(error: ChainError) -> Self {
        Self {
            valid: false,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<(), ChainError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Fully verify a chain: freshness, replay, allowlist, signature, lineage.
///
/// Every ACK visited consumes its nonce in the verifier's store.
pub fn verify_ack_chain(acks: &[FederationAck], verifier: &AckVerifier) -> ChainVerification {
    walk(acks, |ack| verifier.verify(ack).into_result())
}

/// Signature and lineage only.
///
/// For auditing ACKs already in the ledger, whose timestamps are past the
/// freshness window and whose nonces were consumed at ingest.
pub fn audit_chain(acks: &[FederationAck], key: &SharedKey) -> ChainVerification {
    walk(acks, |ack| verify_signature(ack, key))
}

/// Lineage continuity only, no cryptography.
pub fn verify_lineage(acks: &[FederationAck]) -> ChainVerification {
    walk(acks, |_| Ok(()))
}

fn walk<F>(acks: &[FederationAck], mut check: F) -> ChainVerification
where
    F: FnMut(&FederationAck) -> Result<(), VerifyError>,
{
    let mut sorted: Vec<&FederationAck> = acks.iter().collect();
    sorted.sort_by_key(|ack| ack.timestamp);

    for (index, ack) in sorted.iter().enumerate() {
        if let Err(reason) = check(ack) {
            return ChainVerification::broken(ChainError::ChainBreak { index, reason });
        }

        if index > 0 {
            if let Some(prev) = ack.prev_link() {
                if prev != sorted[index - 1].signature {
                    return ChainVerification::broken(ChainError::LineageBreak { index });
                }
            }
        }
    }

    ChainVerification::ok()
}
