//! Error types for Fedack Core.
//!
//! Verification failures ([`VerifyError`], [`ChainError`]) are returned as
//! data inside verification results, never raised. Their `Display` output is
//! the wire code other nodes and dashboards branch on.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why a single ACK failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum VerifyError {
    #[error("node_not_allowed")]
    NodeNotAllowed,

    #[error("timestamp_expired")]
    TimestampExpired,

    #[error("timestamp_future")]
    TimestampFuture,

    #[error("nonce_replay")]
    NonceReplay,

    #[error("signature_mismatch")]
    SignatureMismatch,
}

impl VerifyError {
    /// The wire code for this failure.
    pub const fn code(&self) -> &'static str {
        match self {
            VerifyError::NodeNotAllowed => "node_not_allowed",
            VerifyError::TimestampExpired => "timestamp_expired",
            VerifyError::TimestampFuture => "timestamp_future",
            VerifyError::NonceReplay => "nonce_replay",
            VerifyError::SignatureMismatch => "signature_mismatch",
        }
    }
}

impl Serialize for VerifyError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// Why an ordered set of ACKs failed chain verification.
///
/// `index` is the position in timestamp order, not in the caller's slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The ACK at `index` is individually invalid.
    #[error("chain_break_at_{index}: {reason}")]
    ChainBreak { index: usize, reason: VerifyError },

    /// The ACK at `index` does not link to its predecessor's signature.
    #[error("lineage_break_at_{index}: prev_signature mismatch")]
    LineageBreak { index: usize },
}

impl ChainError {
    /// Position of the offending ACK in timestamp order.
    pub const fn index(&self) -> usize {
        match self {
            ChainError::ChainBreak { index, .. } | ChainError::LineageBreak { index } => *index,
        }
    }
}

impl Serialize for ChainError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Errors from constructing or encoding ACKs.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid event id: {0}")]
    InvalidEventId(String),

    #[error("invalid batch id: {0}")]
    InvalidBatchId(String),

    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    #[error("signing secret must not be empty")]
    EmptyKey,
}
