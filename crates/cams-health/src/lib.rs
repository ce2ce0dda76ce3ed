//! Fleet availability probing and night quality evaluation for camsync.
//!
//! - [`RetryPolicy`]: reusable exponential backoff (max retries, base delay, multiplier)
//! - [`AvailabilityProber`]: gates every remote call of a check on a reachable fleet
//! - [`NightQualityEvaluator`]: decides whether a night's captures are worth showing
//! - [`GoodNightSearch`]: walks back from yesterday to the last good night

#![forbid(unsafe_code)]

pub mod search;

use cams_proto::StationId;
use cams_remote::{RemoteDirectoryService, RemoteError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub use search::{GoodNightSearch, MAX_LOOKBACK_DAYS};

/// Default minimum average number of captures per station for a good night.
pub const DEFAULT_MIN_AVERAGE_CAPTURES: f64 = 10.0;

// ─── Retry Policy ─────────────────────────────────────────────────────────────

/// Exponential backoff between attempts of one remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * multiplier^(retry-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// All delays of a full run, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(|retry| self.delay_for(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

// ─── Availability Prober ──────────────────────────────────────────────────────

/// Checks that the fleet answers before any directory or fetch call is made.
#[derive(Debug, Clone)]
pub struct AvailabilityProber {
    remote: Arc<dyn RemoteDirectoryService>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl AvailabilityProber {
    pub fn new(
        remote: Arc<dyn RemoteDirectoryService>,
        policy: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            policy,
            attempt_timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Probe with the configured number of retries.
    pub async fn probe_default(&self) -> bool {
        self.probe(self.policy.max_retries).await
    }

    /// One attempt plus up to `max_retries` retries, sleeping the policy delay
    /// between attempts. True only on an explicit success reply.
    pub async fn probe(&self, max_retries: u32) -> bool {
        let attempts = max_retries + 1;

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(self.attempt_timeout, self.remote.ping()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout {
                    operation: "ping".to_string(),
                    timeout: self.attempt_timeout,
                }),
            };

            match outcome {
                Ok(()) => {
                    info!(fleet = %self.remote.name(), attempt, "fleet reachable");
                    return true;
                }
                Err(e) => {
                    warn!(fleet = %self.remote.name(), attempt, error = %e, "availability probe failed");
                }
            }

            if attempt < attempts {
                let delay = self.policy.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before next probe");
                tokio::time::sleep(delay).await;
            }
        }

        error!(fleet = %self.remote.name(), attempts, "fleet unreachable, giving up");
        false
    }
}

// ─── Night Quality Evaluator ──────────────────────────────────────────────────

/// Accepts a night when the average capture count across all known stations
/// reaches a fixed minimum. Zero-count stations take part in the average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NightQualityEvaluator {
    pub min_average: f64,
}

impl NightQualityEvaluator {
    pub fn new(min_average: f64) -> Self {
        Self { min_average }
    }

    /// Arithmetic mean of the counts, `None` for an empty mapping.
    pub fn average(counts: &BTreeMap<StationId, u32>) -> Option<f64> {
        if counts.is_empty() {
            return None;
        }
        let total: u64 = counts.values().map(|&c| u64::from(c)).sum();
        Some(total as f64 / counts.len() as f64)
    }

    pub fn is_good(&self, counts: &BTreeMap<StationId, u32>) -> bool {
        Self::average(counts).is_some_and(|avg| avg >= self.min_average)
    }
}

impl Default for NightQualityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_AVERAGE_CAPTURES)
    }
}
