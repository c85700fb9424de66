//! # Fedack Core
//!
//! Pure primitives for federated acknowledgments (ACKs): signed,
//! replay-protected, chain-linked receipts that nodes produce for events.
//!
//! This crate contains no file or database I/O. The collaborators it needs
//! (nonce store, health tracker, clock) are traits, with in-memory
//! implementations for tests and single-process deployments.
//!
//! ## Key Types
//!
//! - [`FederationAck`] - The signed unit of trust
//! - [`UnsignedAck`] / [`AckBuilder`] - An ACK before signing
//! - [`LedgerEntry`] - An ACK plus ledger-local metadata
//! - [`SharedKey`] - The HMAC-SHA256 signing secret
//! - [`AckVerifier`] - Freshness, replay, allowlist and signature checks
//!
//! ## Canonicalization
//!
//! Signer and verifier agree on bytes through [`canonical::canonical_ack`]:
//! sorted-key JSON with `prev_signature` always present.

pub mod ack;
pub mod canonical;
pub mod chain;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod health;
pub mod nonce;
pub mod types;
pub mod verify;

pub use ack::{AckBuilder, FederationAck, LedgerEntry, Signable, UnsignedAck};
pub use canonical::{canonical_ack, canonical_json};
pub use chain::{audit_chain, verify_ack_chain, verify_lineage, ChainVerification};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{compare_nonce, sign_ack, SharedKey};
pub use error::{ChainError, CoreError, VerifyError};
pub use health::{HealthMetrics, HealthTracker, SkewStatus, SkewTracker, SKEW_FAIL_MS, SKEW_WARN_MS};
pub use nonce::{MemoryNonceStore, NonceStore};
pub use types::{
    generate_batch_id, generate_event_id, generate_nonce, is_valid_batch_id, is_valid_event_id,
    is_valid_nonce, parse_batch_id,
};
pub use verify::{
    verify_signature, AckVerifier, VerificationResult, VerifyOptions, DEFAULT_MAX_AGE_SEC,
    MAX_FUTURE_SKEW_MS,
};
