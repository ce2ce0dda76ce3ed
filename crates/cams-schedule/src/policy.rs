//! Pure scheduling decisions.
//!
//! Each function takes the persisted state explicitly and performs no I/O, so
//! the whole policy can be checked without a fleet or a clock.

use cams_health::NightQualityEvaluator;
use cams_proto::{PersistedState, StationId, StationSnapshot};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::Serialize;
use std::collections::BTreeSet;

/// Whether the once-per-day check should run at `now`.
pub fn check_due(state: &PersistedState, now: NaiveDateTime, check_hour: u32) -> bool {
    if now.hour() < check_hour {
        return false;
    }
    match state.last_check {
        // a check "in the future" means the clock moved back
        Some(last) => last.date() < now.date() || last > now,
        None => true,
    }
}

/// How a due check learns whether the fleet is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeGate {
    /// Run the availability probe.
    Probe,
    /// Last probe is recent and succeeded.
    AssumeAvailable,
    /// Last probe is recent and failed.
    AssumeUnavailable,
}

pub fn probe_gate(state: &PersistedState, now: NaiveDateTime, interval: TimeDelta) -> ProbeGate {
    let Some(last) = state.last_server_check else {
        return ProbeGate::Probe;
    };
    // a probe "in the future" means the clock moved back; probe again
    if last > now || now - last >= interval {
        return ProbeGate::Probe;
    }
    if state.last_server_ok {
        ProbeGate::AssumeAvailable
    } else {
        ProbeGate::AssumeUnavailable
    }
}

/// Outcome of the novelty and quality checks for one candidate snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchDecision {
    /// Some station's directory differs from the last fetched one.
    pub novel: bool,
    /// The snapshot passes the night quality threshold.
    pub good: bool,
    /// No station has ever been fetched.
    pub first_run: bool,
    /// The snapshot has nothing to fetch.
    pub empty: bool,
}

impl FetchDecision {
    pub fn should_fetch(&self) -> bool {
        !self.empty && ((self.novel && self.good) || self.first_run)
    }

    /// Fetch happens only because nothing was ever fetched before.
    pub fn is_first_run_override(&self) -> bool {
        self.should_fetch() && !(self.novel && self.good)
    }
}

/// Judge `snapshot` against the last fetch. Quality is measured over every
/// `known` station, so stations missing from the snapshot count as zero.
pub fn decide_fetch(
    state: &PersistedState,
    snapshot: &StationSnapshot,
    known: &BTreeSet<StationId>,
    evaluator: &NightQualityEvaluator,
) -> FetchDecision {
    FetchDecision {
        novel: snapshot.differs_from(&state.last_dirs),
        good: evaluator.is_good(&snapshot.counts_over(known)),
        first_run: state.is_first_run(),
        empty: snapshot.is_empty(),
    }
}
