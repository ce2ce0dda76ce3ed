//! Scheduling state machine for camsync.
//!
//! Decides once per day, and only while the fleet answers, whether fresh
//! capture directories are worth pulling; fetches and converts them; and
//! keeps [`PersistedState`](cams_proto::PersistedState) in step with what is
//! on disk.
//!
//! - [`policy`]: pure decision functions over the persisted state
//! - [`Scheduler`]: the check routine, forced fetch and good-night report

#![forbid(unsafe_code)]

pub mod policy;
pub mod scheduler;

use cams_convert::{ConversionSummary, ConvertError};
use cams_fetch::{FetchError, FetchReport};
use cams_health::{DEFAULT_MIN_AVERAGE_CAPTURES, MAX_LOOKBACK_DAYS, RetryPolicy};
use cams_proto::{StationId, StationSnapshot};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use policy::{FetchDecision, ProbeGate, check_due, decide_fetch, probe_gate};
pub use scheduler::Scheduler;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("station fleet unavailable")]
    ServerUnavailable,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("conversion task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local hour from which the daily check may run
    #[serde(default = "default_check_hour")]
    pub check_hour: u32,

    /// Minimum time between availability probes in seconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Retries after the first probe attempt
    #[serde(default = "default_probe_retries")]
    pub probe_retries: u32,

    /// Hard limit for one probe attempt in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_retry_base")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: u32,

    /// Minimum average captures per known station for a good night
    #[serde(default = "default_min_average")]
    pub min_average_captures: f64,

    #[serde(default = "default_lookback")]
    pub max_lookback_days: u32,

    /// Stations assumed when discovery fails and none were ever active
    #[serde(default = "default_fallback_stations")]
    pub fallback_stations: Vec<StationId>,

    /// Scheduling state file, relative to `data_root` unless absolute
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Directory holding the state file and the working set slots
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// HDU of a capture file that holds the displayed image
    #[serde(default = "default_frame_hdu")]
    pub frame_hdu: usize,
}

fn default_check_hour() -> u32 {
    9
}

fn default_probe_interval() -> u64 {
    3600
}

fn default_probe_retries() -> u32 {
    3
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_retry_base() -> u64 {
    1000
}

fn default_retry_multiplier() -> u32 {
    2
}

fn default_min_average() -> f64 {
    DEFAULT_MIN_AVERAGE_CAPTURES
}

fn default_lookback() -> u32 {
    MAX_LOOKBACK_DAYS
}

fn default_fallback_stations() -> Vec<StationId> {
    vec![StationId::from("BE000D")]
}

fn default_state_file() -> PathBuf {
    PathBuf::from("latest_state.json")
}

fn default_data_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_frame_hdu() -> usize {
    cams_convert::fits::DEFAULT_HDU
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_hour: default_check_hour(),
            probe_interval_secs: default_probe_interval(),
            probe_retries: default_probe_retries(),
            probe_timeout_secs: default_probe_timeout(),
            retry_base_ms: default_retry_base(),
            retry_multiplier: default_retry_multiplier(),
            min_average_captures: default_min_average(),
            max_lookback_days: default_lookback(),
            fallback_stations: default_fallback_stations(),
            state_file: default_state_file(),
            data_root: default_data_root(),
            frame_hdu: default_frame_hdu(),
        }
    }
}

impl ScheduleConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.probe_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            multiplier: self.retry_multiplier,
        }
    }

    pub fn probe_interval(&self) -> TimeDelta {
        let secs = i64::try_from(self.probe_interval_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        TimeDelta::seconds(secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Resolve `path` against `data_root` unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }
}

// ─── Phases ───────────────────────────────────────────────────────────────────

/// How a check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Already checked today, or before the check hour.
    NotDue,
    /// The fleet did not answer (now or at the last recent probe).
    ServerUnavailable,
    /// Nothing novel and good enough to fetch.
    NoNewData,
    /// A fetch ran but no station delivered capture files.
    NothingTransferred,
    /// A new working set was promoted.
    Updated,
}

/// Phases of one check, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPhase {
    Idle,
    CheckDue,
    Probing,
    Searching,
    Deciding,
    Fetching,
    Converting,
    Settled(Settlement),
}

// ─── Check Report ─────────────────────────────────────────────────────────────

/// Everything one check (or forced fetch) did.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub cycle: Uuid,
    /// Phases visited, ending with `Settled`.
    pub phases: Vec<CheckPhase>,
    pub settlement: Settlement,
    /// Candidate data the decision was made on.
    pub snapshot: StationSnapshot,
    /// The good-night search came up empty and the latest directories were used.
    pub used_latest: bool,
    pub decision: Option<FetchDecision>,
    pub fetch: Option<FetchReport>,
    pub conversion: Option<ConversionSummary>,
}

impl CheckReport {
    pub(crate) fn new(cycle: Uuid) -> Self {
        Self {
            cycle,
            phases: vec![CheckPhase::Idle],
            settlement: Settlement::NotDue,
            snapshot: StationSnapshot::new(),
            used_latest: false,
            decision: None,
            fetch: None,
            conversion: None,
        }
    }

    pub(crate) fn enter(&mut self, phase: CheckPhase) {
        self.phases.push(phase);
    }

    pub(crate) fn settle(mut self, settlement: Settlement) -> Self {
        self.settlement = settlement;
        self.phases.push(CheckPhase::Settled(settlement));
        self
    }

    /// A new working set was promoted; the display must be rebuilt.
    pub fn data_changed(&self) -> bool {
        self.fetch.as_ref().is_some_and(|f| f.promoted)
    }

    /// A promoted working set that was both novel and good. A first-run
    /// fetch of poor data changes the data without counting as found.
    pub fn new_data_found(&self) -> bool {
        self.data_changed() && self.decision.is_some_and(|d| d.novel && d.good)
    }
}
