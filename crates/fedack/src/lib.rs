//! # Fedack
//!
//! The unified API for federated acknowledgments: signed, replay-protected,
//! chain-linked receipts that nodes produce for events, persisted in an
//! idempotent, queryable ledger.
//!
//! ## Overview
//!
//! - **Signing**: HMAC-SHA256 over a canonical JSON form
//! - **Verification**: allowlist, freshness window, nonce replay, signature
//! - **Chains**: per-ACK validity plus `prev_signature` lineage
//! - **Ledger**: SQLite, duplicate inserts are no-ops, JSONL export
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fedack::{Federation, FederationConfig};
//! use serde_json::json;
//!
//! // Refuses to start in production without FEDERATION_KEY.
//! let config = FederationConfig::from_env().unwrap();
//! let federation = Federation::open(&config).unwrap();
//!
//! let ack = federation.create_ack("payment.recovered", json!({"amount": 120}), None);
//! assert!(federation.verify(&ack).valid);
//!
//! federation.export_jsonl().unwrap();
//! federation.close().unwrap();
//! ```
//!
//! ## Re-exports
//!
//! - `fedack::core` - ACK types, canonicalization, signing, verification
//! - `fedack::store` - Ledger stores, export, durable nonce store

pub mod config;
pub mod error;
pub mod federation;

pub use fedack_core as core;
pub use fedack_store as store;

pub use config::{ConfigError, DeploymentMode, FederationConfig, DEV_FALLBACK_KEY};
pub use error::{FederationError, Result};
pub use federation::{
    AckBatch, BatchReport, BatchStatus, Federation, IngestOutcome, ItemReport, ItemStatus,
    LedgerStats, RejectReason, MAX_ITEMS_PER_BATCH,
};

pub use fedack_core::{
    AckBuilder, ChainError, ChainVerification, FederationAck, LedgerEntry, SharedKey,
    UnsignedAck, VerificationResult, VerifyError, VerifyOptions,
};
pub use fedack_store::{AckStore, MemoryAckStore, SqliteAckStore};
