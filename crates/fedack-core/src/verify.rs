//! ACK verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. Node allowlist, if configured
//! 2. Too old: age beyond `max_age_sec`
//! 3. Too new: more than [`MAX_FUTURE_SKEW_MS`] ahead of now
//! 4. Replay: nonce already seen (otherwise it is recorded here, before
//!    the signature is checked)
//! 5. Signature: length, then constant-time comparison
//!
//! Clock skew is reported to the health tracker once the allowlist passes,
//! whatever the outcome of the later checks. Failures are returned as
//! [`VerificationResult`] values, never as errors.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::ack::FederationAck;
use crate::clock::{Clock, SystemClock};
use crate::crypto::SharedKey;
use crate::error::VerifyError;
use crate::health::HealthTracker;
use crate::nonce::NonceStore;

/// Default freshness window in seconds.
pub const DEFAULT_MAX_AGE_SEC: u64 = 300;

/// How far ahead of the local clock an ACK may be stamped.
pub const MAX_FUTURE_SKEW_MS: i64 = 90_000;

/// Per-call verification policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Freshness window in seconds. Also the nonce TTL.
    pub max_age_sec: u64,
    /// When set, only these node ids are accepted. An empty set accepts none.
    pub allowed_nodes: Option<BTreeSet<String>>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_age_sec: DEFAULT_MAX_AGE_SEC,
            allowed_nodes: None,
        }
    }
}

impl VerifyOptions {
    pub fn with_max_age_sec(mut self, max_age_sec: u64) -> Self {
        self.max_age_sec = max_age_sec;
        self
    }

    pub fn with_allowed_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_nodes = Some(nodes.into_iter().map(Into::into).collect());
        self
    }

    fn max_age_ms(&self) -> i64 {
        i64::try_from(self.max_age_sec)
            .unwrap_or(i64::MAX)
            .saturating_mul(1_000)
    }

    fn allows(&self, node_id: &str) -> bool {
        self.allowed_nodes
            .as_ref()
            .map_or(true, |allowed| allowed.contains(node_id))
    }
}

/// Outcome of verifying one ACK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<VerifyError>,
    /// `ack.timestamp - now`. Absent when the allowlist rejected the ACK.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_skew_ms: Option<i64>,
}

impl VerificationResult {
    pub fn accepted(clock_skew_ms: i64) -> Self {
        Self {
            valid: true,
            error: None,
            clock_skew_ms: Some(clock_skew_ms),
        }
    }

    pub fn rejected(error: VerifyError, clock_skew_ms: Option<i64>) -> Self {
        Self {
            valid: false,
            error: Some(error),
            clock_skew_ms,
        }
    }

    pub fn into_result(self) -> Result<(), VerifyError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Verifies ACKs against a shared key and the replay/health collaborators.
pub struct AckVerifier {
    key: SharedKey,
    options: VerifyOptions,
    nonces: Arc<dyn NonceStore>,
    health: Arc<dyn HealthTracker>,
    clock: Arc<dyn Clock>,
}

impl AckVerifier {
    pub fn new(
        key: SharedKey,
        nonces: Arc<dyn NonceStore>,
        health: Arc<dyn HealthTracker>,
    ) -> Self {
        Self {
            key,
            options: VerifyOptions::default(),
            nonces,
            health,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    pub fn key(&self) -> &SharedKey {
        &self.key
    }

    /// Verify with the verifier's default options.
    pub fn verify(&self, ack: &FederationAck) -> VerificationResult {
        self.verify_with(ack, &self.options)
    }

    /// Verify with explicit options.
    pub fn verify_with(&self, ack: &FederationAck, options: &VerifyOptions) -> VerificationResult {
        if !options.allows(&ack.node_id) {
            return VerificationResult::rejected(VerifyError::NodeNotAllowed, None);
        }

        let now = self.clock.now_millis();
        let skew = ack.timestamp.saturating_sub(now);
        self.health.record_clock_skew(skew);

        if now.saturating_sub(ack.timestamp) > options.max_age_ms() {
            return VerificationResult::rejected(VerifyError::TimestampExpired, Some(skew));
        }

        if ack.timestamp > now.saturating_add(MAX_FUTURE_SKEW_MS) {
            return VerificationResult::rejected(VerifyError::TimestampFuture, Some(skew));
        }

        let ttl = Duration::from_secs(options.max_age_sec);
        if !self.nonces.check_and_record(&ack.nonce, ttl) {
            return VerificationResult::rejected(VerifyError::NonceReplay, Some(skew));
        }

        match verify_signature(ack, &self.key) {
            Ok(()) => VerificationResult::accepted(skew),
            Err(error) => VerificationResult::rejected(error, Some(skew)),
        }
    }

    /// Signature check only: no freshness, replay or allowlist.
    pub fn verify_signature(&self, ack: &FederationAck) -> Result<(), VerifyError> {
        verify_signature(ack, &self.key)
    }
}

impl std::fmt::Debug for AckVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckVerifier")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Recompute the HMAC of `ack` and compare it to `ack.signature`.
pub fn verify_signature(ack: &FederationAck, key: &SharedKey) -> Result<(), VerifyError> {
    if key.verify_hex(ack.canonical().as_bytes(), &ack.signature) {
        Ok(())
    } else {
        Err(VerifyError::SignatureMismatch)
    }
}
