//! # Fedack Testkit
//!
//! Testing utilities for federated ACKs.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed ACKs with their expected canonical form and
//!   signature, for checking other implementations against this one
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A pinned clock plus shared collaborators for scenario tests
//!
//! ## Golden Vectors
//!
//! ```rust
//! use fedack_testkit::vectors::verify_all_vectors;
//!
//! for (name, passed, detail) in verify_all_vectors() {
//!     assert!(passed, "{name}: {detail}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use fedack_testkit::generators::{ack_from_params, AckParams};
//!
//! proptest! {
//!     #[test]
//!     fn signature_is_deterministic(params: AckParams) {
//!         let a = ack_from_params(&params);
//!         let b = ack_from_params(&params);
//!         prop_assert_eq!(a.signature, b.signature);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use fedack_testkit::fixtures::AckFixture;
//! use serde_json::json;
//!
//! let fixture = AckFixture::new();
//! let ack = fixture.make_ack("payment.recovered", json!({"amount": 120}));
//! assert!(fixture.verifier().verify(&ack).valid);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_node_fixtures, AckFixture, FIXED_NOW};
pub use generators::{ack_from_params, AckParams};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector, GOLDEN_KEY};
