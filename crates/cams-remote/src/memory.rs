//! In-memory station fleet.
//!
//! Deterministic stand-in for the remote fleet: stations, directories and
//! capture files are declared up front, and failures can be injected per
//! station or per operation. Every call is recorded so callers can assert on
//! what was (or was not) asked of the fleet.

use crate::{RemoteDirectoryService, RemoteError, RemoteResult, check_directory_name, count_local_captures};
use async_trait::async_trait;
use cams_proto::{StationDir, StationId, directory_date, latest_directory_name};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

/// A call made against the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Ping,
    ListStations,
    Latest(StationId),
    ForDate(StationId, NaiveDate),
    Fetch(StationId, String),
}

/// How the fleet answers `ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PingBehavior {
    #[default]
    Ok,
    Refused,
    /// Never answers; only a caller-side timeout ends the call.
    Hang,
}

type Directory = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Default)]
struct FleetInner {
    stations: BTreeMap<StationId, BTreeMap<String, Directory>>,
    ping: PingBehavior,
    refused_pings: u32,
    discovery_fails: bool,
    failing_stations: BTreeSet<StationId>,
    failing_fetches: BTreeSet<StationId>,
    calls: Vec<RemoteCall>,
}

#[derive(Debug, Default)]
pub struct InMemoryFleet {
    inner: Mutex<FleetInner>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a capture directory with `captures` empty capture files.
    ///
    /// File names follow the station convention
    /// `FF_<STATION>_<YYYYMMDD>_<HHMMSS>_<ms>_<frame>.fits`.
    pub fn add_directory(&self, station: &str, directory: &str, captures: u32) -> &Self {
        let date = directory_date(directory)
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "19700101".to_string());
        let files = (0..captures)
            .map(|i| {
                let name = format!(
                    "FF_{station}_{date}_{:02}{:02}{:02}_{:03}_{:07}.fits",
                    22 + i / 3600 % 2,
                    i / 60 % 60,
                    i % 60,
                    i % 1000,
                    i * 256
                );
                (name, Vec::new())
            })
            .collect();
        self.inner
            .lock()
            .stations
            .entry(StationId::from(station))
            .or_default()
            .insert(directory.to_string(), files);
        self
    }

    /// Add one capture file with explicit content.
    pub fn add_file(&self, station: &str, directory: &str, name: &str, content: Vec<u8>) -> &Self {
        self.inner
            .lock()
            .stations
            .entry(StationId::from(station))
            .or_default()
            .entry(directory.to_string())
            .or_default()
            .insert(name.to_string(), content);
        self
    }

    pub fn set_ping(&self, behavior: PingBehavior) -> &Self {
        self.inner.lock().ping = behavior;
        self
    }

    /// Refuse the next `n` pings, then answer per the ping behavior.
    pub fn refuse_pings(&self, n: u32) -> &Self {
        self.inner.lock().refused_pings = n;
        self
    }

    pub fn fail_discovery(&self, fails: bool) -> &Self {
        self.inner.lock().discovery_fails = fails;
        self
    }

    /// Make every directory query for `station` fail.
    pub fn fail_station(&self, station: &str) -> &Self {
        self.inner.lock().failing_stations.insert(StationId::from(station));
        self
    }

    /// Make transfers for `station` fail.
    pub fn fail_fetch(&self, station: &str) -> &Self {
        self.inner.lock().failing_fetches.insert(StationId::from(station));
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Dates queried via `directory_for_date`, in call order, deduplicated.
    pub fn queried_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = Vec::new();
        for call in self.inner.lock().calls.iter() {
            if let RemoteCall::ForDate(_, date) = call
                && dates.last() != Some(date)
            {
                dates.push(*date);
            }
        }
        dates
    }

    fn record(&self, call: RemoteCall) {
        self.inner.lock().calls.push(call);
    }

    fn station_query(&self, operation: &str, station: &StationId) -> RemoteResult<Vec<(String, u32)>> {
        let inner = self.inner.lock();
        if inner.failing_stations.contains(station) {
            return Err(RemoteError::Command {
                operation: operation.to_string(),
                message: format!("station {station} unreachable"),
            });
        }
        Ok(inner
            .stations
            .get(station)
            .map(|dirs| {
                dirs.iter()
                    .map(|(name, files)| (name.clone(), files.len() as u32))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl RemoteDirectoryService for InMemoryFleet {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.record(RemoteCall::Ping);
        let behavior = {
            let mut inner = self.inner.lock();
            if inner.refused_pings > 0 {
                inner.refused_pings -= 1;
                PingBehavior::Refused
            } else {
                inner.ping
            }
        };
        match behavior {
            PingBehavior::Ok => Ok(()),
            PingBehavior::Refused => Err(RemoteError::Command {
                operation: "ping".to_string(),
                message: "connection refused".to_string(),
            }),
            PingBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(RemoteError::Timeout {
                    operation: "ping".to_string(),
                    timeout: Duration::from_secs(24 * 3600),
                })
            }
        }
    }

    async fn list_stations(&self) -> RemoteResult<BTreeSet<StationId>> {
        self.record(RemoteCall::ListStations);
        let inner = self.inner.lock();
        if inner.discovery_fails {
            return Err(RemoteError::Command {
                operation: "list directories".to_string(),
                message: "ls: cannot access archive".to_string(),
            });
        }
        Ok(inner.stations.keys().cloned().collect())
    }

    async fn latest_directory(&self, station: &StationId) -> RemoteResult<Option<StationDir>> {
        self.record(RemoteCall::Latest(station.clone()));
        let dirs = self.station_query("latest directory", station)?;
        let latest = latest_directory_name(dirs.iter().map(|(name, _)| name.as_str()));
        Ok(latest.and_then(|name| {
            dirs.iter()
                .find(|(n, _)| n == name)
                .map(|(n, count)| StationDir::new(n.clone(), *count))
        }))
    }

    async fn directory_for_date(
        &self,
        station: &StationId,
        date: NaiveDate,
    ) -> RemoteResult<Option<StationDir>> {
        self.record(RemoteCall::ForDate(station.clone(), date));
        let dirs = self.station_query("directory for date", station)?;
        Ok(dirs
            .into_iter()
            .filter(|(name, _)| directory_date(name) == Some(date))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(name, count)| StationDir::new(name, count)))
    }

    async fn fetch_directory(
        &self,
        station: &StationId,
        directory: &str,
        dest: &Path,
    ) -> RemoteResult<u32> {
        self.record(RemoteCall::Fetch(station.clone(), directory.to_string()));
        check_directory_name("fetch", directory)?;

        let files = {
            let inner = self.inner.lock();
            if inner.failing_fetches.contains(station) || inner.failing_stations.contains(station) {
                return Err(RemoteError::Command {
                    operation: "fetch".to_string(),
                    message: format!("rsync: connection to {station} unexpectedly closed"),
                });
            }
            inner
                .stations
                .get(station)
                .and_then(|dirs| dirs.get(directory))
                .cloned()
                .ok_or_else(|| RemoteError::Command {
                    operation: "fetch".to_string(),
                    message: format!("no such directory {directory}"),
                })?
        };

        tokio::fs::create_dir_all(dest).await?;
        for (name, content) in files {
            tokio::fs::write(dest.join(name), content).await?;
        }
        Ok(count_local_captures(dest)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fleet() -> InMemoryFleet {
        let fleet = InMemoryFleet::new();
        fleet
            .add_directory("BE000D", "BE000D_20231013_170000_000001", 4)
            .add_directory("BE000D", "BE000D_20231014_170000_000001", 12)
            .add_directory("NL0001", "NL0001_20231014_171500_000001", 3);
        fleet
    }

    #[tokio::test]
    async fn test_list_and_latest() {
        let fleet = fleet();
        let stations = fleet.list_stations().await.unwrap();
        assert_eq!(stations.len(), 2);

        let latest = fleet
            .latest_directory(&StationId::from("BE000D"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.directory, "BE000D_20231014_170000_000001");
        assert_eq!(latest.capture_count, 12);

        assert!(
            fleet
                .latest_directory(&StationId::from("XX0000"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_directory_for_date() {
        let fleet = fleet();
        let found = fleet
            .directory_for_date(&StationId::from("BE000D"), date(2023, 10, 13))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.capture_count, 4);

        let missing = fleet
            .directory_for_date(&StationId::from("NL0001"), date(2023, 10, 13))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let fleet = fleet();
        fleet.fail_station("NL0001").refuse_pings(1);

        assert!(fleet.ping().await.is_err());
        assert!(fleet.ping().await.is_ok());
        assert!(
            fleet
                .latest_directory(&StationId::from("NL0001"))
                .await
                .is_err()
        );
        assert_eq!(fleet.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_writes_files() {
        let fleet = fleet();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("BE000D");

        let count = fleet
            .fetch_directory(
                &StationId::from("BE000D"),
                "BE000D_20231014_170000_000001",
                &dest,
            )
            .await
            .unwrap();
        assert_eq!(count, 12);
        let names: Vec<_> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| n.starts_with("FF_BE000D_20231014_")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_ping_only_ends_by_timeout() {
        let fleet = InMemoryFleet::new();
        fleet.set_ping(PingBehavior::Hang);
        let res = tokio::time::timeout(Duration::from_secs(5), fleet.ping()).await;
        assert!(res.is_err());
    }
}
