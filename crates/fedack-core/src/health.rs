//! Clock-skew health tracking.
//!
//! The verifier reports `ack.timestamp - now` for every ACK it sees, valid
//! or not. [`SkewTracker`] smooths those samples with an exponential moving
//! average and classifies the result.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Smoothing factor for the skew average.
const EMA_ALPHA: f64 = 0.3;

/// Absolute skew at or above which status is `warn`.
pub const SKEW_WARN_MS: i64 = 30_000;

/// Absolute skew at or above which status is `fail`.
pub const SKEW_FAIL_MS: i64 = 90_000;

/// Receives clock-skew samples. Must never affect verification outcome.
pub trait HealthTracker: Send + Sync {
    fn record_clock_skew(&self, skew_ms: i64);
}

/// Classification of the smoothed skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkewStatus {
    Ok,
    Warn,
    Fail,
}

impl SkewStatus {
    fn classify(skew_ms: f64) -> Self {
        let abs = skew_ms.abs();
        if abs >= SKEW_FAIL_MS as f64 {
            SkewStatus::Fail
        } else if abs >= SKEW_WARN_MS as f64 {
            SkewStatus::Warn
        } else {
            SkewStatus::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// Smoothed skew, rounded to whole ms. Positive means ACKs run ahead.
    pub clock_skew_ms: i64,
    pub clock_skew_status: SkewStatus,
    /// Unix ms of the last sample or reset.
    pub last_updated: i64,
    pub sample_count: u64,
}

impl HealthMetrics {
    fn empty(now: i64) -> Self {
        Self {
            clock_skew_ms: 0,
            clock_skew_status: SkewStatus::Ok,
            last_updated: now,
            sample_count: 0,
        }
    }
}

/// In-process [`HealthTracker`] keeping an EMA of skew samples.
pub struct SkewTracker {
    metrics: Mutex<HealthMetrics>,
    clock: Arc<dyn Clock>,
}

impl SkewTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            metrics: Mutex::new(HealthMetrics::empty(clock.now_millis())),
            clock,
        }
    }

    pub fn metrics(&self) -> HealthMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        *metrics = HealthMetrics::empty(self.clock.now_millis());
    }
}

impl Default for SkewTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker for SkewTracker {
    fn record_clock_skew(&self, skew_ms: i64) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);

        let smoothed = if metrics.sample_count == 0 {
            skew_ms as f64
        } else {
            metrics.clock_skew_ms as f64 * (1.0 - EMA_ALPHA) + skew_ms as f64 * EMA_ALPHA
        };

        metrics.clock_skew_ms = smoothed.round() as i64;
        metrics.clock_skew_status = SkewStatus::classify(smoothed);
        metrics.last_updated = self.clock.now_millis();
        metrics.sample_count += 1;
    }
}

impl std::fmt::Debug for SkewTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SkewTracker").field(&self.metrics()).finish()
    }
}
