//! Shared types for the camsync station fleet.
//!
//! Defines station identifiers, per-station capture directory records, the
//! snapshots used for one quality decision, and the scheduling state that is
//! persisted between runs of the slideshow.

#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// File extension of raw capture files produced by a station.
pub const CAPTURE_EXTENSION: &str = "fits";

/// Station key used when migrating single-station state files.
pub const LEGACY_STATION: &str = "default";

/// Active working directory used when the state file names none.
pub const DEFAULT_IMAGE_DIR: &str = "current";

// ─── Stations ─────────────────────────────────────────────────────────────────

/// Identifier of a capture station (e.g. `BE000D`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Station ids are short and strictly alphanumeric.
    pub fn is_valid(id: &str) -> bool {
        !id.is_empty() && id.len() <= 16 && id.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One capture directory on a station and the number of capture files in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationDir {
    pub directory: String,
    pub capture_count: u32,
}

impl StationDir {
    pub fn new(directory: impl Into<String>, capture_count: u32) -> Self {
        Self {
            directory: directory.into(),
            capture_count,
        }
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// Point-in-time view of station → capture directory used for one decision.
///
/// Snapshots are ephemeral. Only the outcome of a fetch is distilled into
/// [`PersistedState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationSnapshot {
    stations: BTreeMap<StationId, StationDir>,
}

impl StationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, station: StationId, dir: StationDir) {
        self.stations.insert(station, dir);
    }

    pub fn get(&self, station: &str) -> Option<&StationDir> {
        self.stations.get(station)
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StationId, &StationDir)> {
        self.stations.iter()
    }

    pub fn stations(&self) -> impl Iterator<Item = &StationId> {
        self.stations.keys()
    }

    pub fn total_captures(&self) -> u64 {
        self.stations.values().map(|d| u64::from(d.capture_count)).sum()
    }

    /// Capture counts for every station in `known` plus every station in the
    /// snapshot. Known stations without a directory count as zero.
    pub fn counts_over(&self, known: &BTreeSet<StationId>) -> BTreeMap<StationId, u32> {
        let mut counts: BTreeMap<StationId, u32> =
            known.iter().map(|s| (s.clone(), 0)).collect();
        for (station, dir) in &self.stations {
            counts.insert(station.clone(), dir.capture_count);
        }
        counts
    }

    /// True if at least one station points at a directory other than the one
    /// last fetched for it (or was never fetched).
    pub fn differs_from(&self, last_dirs: &BTreeMap<StationId, String>) -> bool {
        self.stations
            .iter()
            .any(|(station, dir)| last_dirs.get(station) != Some(&dir.directory))
    }
}

impl FromIterator<(StationId, StationDir)> for StationSnapshot {
    fn from_iter<I: IntoIterator<Item = (StationId, StationDir)>>(iter: I) -> Self {
        Self {
            stations: iter.into_iter().collect(),
        }
    }
}

// ─── Capture directory names ──────────────────────────────────────────────────
//
// Stations name their nightly directories `<STATION>_<YYYYMMDD>_<HHMMSS>_<us>`,
// optionally followed by a suffix such as `_detected`.

/// Station id encoded in a capture directory name.
pub fn directory_station(name: &str) -> Option<StationId> {
    let id = name.split('_').next()?;
    StationId::is_valid(id).then(|| StationId::from(id))
}

/// Night (start) date encoded in a capture directory name.
pub fn directory_date(name: &str) -> Option<NaiveDate> {
    let field = name.split('_').nth(1)?;
    NaiveDate::parse_from_str(field, "%Y%m%d").ok()
}

/// Pick the most recent directory: highest encoded date, then highest name.
/// Names without a date sort below every dated name.
pub fn latest_directory_name<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .max_by(|a, b| (directory_date(a), *a).cmp(&(directory_date(b), *b)))
}

// ─── Timestamps ───────────────────────────────────────────────────────────────

/// ISO-8601 timestamps with an empty string meaning "never".
pub mod timestamp {
    use super::*;
    use serde::Serializer;

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn format(ts: &Option<NaiveDateTime>) -> String {
        ts.map(|t| t.format(FORMAT).to_string()).unwrap_or_default()
    }

    /// Parse a stored timestamp. Unparseable values read as "never".
    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|t| t.naive_local()))
    }

    pub fn serialize<S: Serializer>(ts: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(ts))
    }
}

// ─── Persisted State ──────────────────────────────────────────────────────────

/// Scheduling record persisted between runs.
///
/// Loaded once at startup, mutated only by the scheduler, and written after
/// every completed decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StateRecord")]
pub struct PersistedState {
    /// Station → last fetched directory name.
    pub last_dirs: BTreeMap<StationId, String>,
    /// Last promotion of new data to the active working set.
    #[serde(serialize_with = "timestamp::serialize")]
    pub last_switch: Option<NaiveDateTime>,
    /// Last completed scheduling evaluation.
    #[serde(serialize_with = "timestamp::serialize")]
    pub last_check: Option<NaiveDateTime>,
    /// Last availability probe attempt.
    #[serde(serialize_with = "timestamp::serialize")]
    pub last_server_check: Option<NaiveDateTime>,
    /// Whether that probe succeeded.
    pub last_server_ok: bool,
    /// Active working directory of displayable images.
    pub image_dir: PathBuf,
    /// Stations considered live. Empty means first run.
    pub active_stations: BTreeSet<StationId>,
}

impl PersistedState {
    pub fn is_first_run(&self) -> bool {
        self.active_stations.is_empty()
    }

    /// Record a promoted fetch: the given stations become the active set.
    pub fn record_fetch<I>(&mut self, fetched: I, at: NaiveDateTime)
    where
        I: IntoIterator<Item = (StationId, String)>,
    {
        self.active_stations.clear();
        for (station, directory) in fetched {
            self.active_stations.insert(station.clone());
            self.last_dirs.insert(station, directory);
        }
        self.last_switch = Some(at);
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            last_dirs: BTreeMap::new(),
            last_switch: None,
            last_check: None,
            last_server_check: None,
            last_server_ok: false,
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            active_stations: BTreeSet::new(),
        }
    }
}

/// On-disk shape accepted when loading, covering every historical layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StateRecord {
    last_dir: Option<String>,
    last_dirs: BTreeMap<StationId, String>,
    last_switch: Option<String>,
    last_check: Option<String>,
    last_server_check: Option<String>,
    last_server_ok: bool,
    image_dir: Option<PathBuf>,
    active_stations: BTreeSet<StationId>,
}

impl From<StateRecord> for PersistedState {
    fn from(record: StateRecord) -> Self {
        let mut last_dirs = record.last_dirs;
        if let Some(dir) = record.last_dir.filter(|d| !d.is_empty()) {
            last_dirs.entry(StationId::from(LEGACY_STATION)).or_insert(dir);
        }

        let parse = |raw: Option<String>| raw.as_deref().and_then(timestamp::parse);

        Self {
            last_dirs,
            last_switch: parse(record.last_switch),
            last_check: parse(record.last_check),
            last_server_check: parse(record.last_server_check),
            last_server_ok: record.last_server_ok,
            image_dir: record
                .image_dir
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            active_stations: record.active_stations,
        }
    }
}
