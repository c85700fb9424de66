//! # Fedack Store
//!
//! Storage for federated ACKs. Provides a trait-based interface for the
//! ledger with SQLite and in-memory implementations, a JSONL exporter, and
//! a durable nonce store.
//!
//! ## Key Types
//!
//! - [`AckStore`] - The trait for all ledger operations
//! - [`SqliteAckStore`] - SQLite-based persistent ledger
//! - [`MemoryAckStore`] - In-memory ledger for tests
//! - [`InsertResult`] - Result of inserting an ACK
//! - [`JsonlExporter`] - Full-dump export with size-based rotation
//! - [`SqliteNonceStore`] - Replay protection that survives restarts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fedack_core::{generate_batch_id, AckBuilder, SharedKey};
//! use fedack_store::{AckStore, InsertResult, SqliteAckStore};
//!
//! let store = SqliteAckStore::open("ack_ledger.db").unwrap();
//! let key = SharedKey::from_static("example-key");
//! let ack = AckBuilder::new("atlas-local", "payment.recovered").sign(&key);
//!
//! let batch = generate_batch_id();
//! assert_eq!(store.insert_ack(&ack, &batch).unwrap(), InsertResult::Inserted);
//! assert_eq!(store.insert_ack(&ack, &batch).unwrap(), InsertResult::AlreadyExists);
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: a duplicate `event_id` returns `AlreadyExists`
//! - **Errors**: every storage failure other than a duplicate propagates
//! - **Indexes**: `batch_id`, `node_id`, `timestamp`, `created_at`

pub mod error;
pub mod export;
pub mod memory;
pub mod migration;
pub mod nonce;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use export::{ExportReport, JsonlExporter, DEFAULT_ROTATE_BYTES};
pub use memory::MemoryAckStore;
pub use nonce::{NonceStats, SqliteNonceStore, FEDERATION_CONTEXT};
pub use sqlite::SqliteAckStore;
pub use traits::{AckStore, InsertResult, LedgerCounts};
