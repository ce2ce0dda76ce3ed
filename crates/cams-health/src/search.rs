//! Good-night search and the "latest directories" fallback tier.

use crate::NightQualityEvaluator;
use cams_proto::{StationId, StationSnapshot};
use cams_remote::RemoteDirectoryService;
use chrono::{Days, NaiveDate, NaiveDateTime};
use futures_util::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of nights inspected by one search.
pub const MAX_LOOKBACK_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct GoodNightSearch {
    remote: Arc<dyn RemoteDirectoryService>,
    evaluator: NightQualityEvaluator,
    max_lookback_days: u32,
}

impl GoodNightSearch {
    pub fn new(
        remote: Arc<dyn RemoteDirectoryService>,
        evaluator: NightQualityEvaluator,
        max_lookback_days: u32,
    ) -> Self {
        Self {
            remote,
            evaluator,
            max_lookback_days,
        }
    }

    pub fn evaluator(&self) -> &NightQualityEvaluator {
        &self.evaluator
    }

    /// First night inspected: yesterday, or the day after `reference` when
    /// that is later.
    pub fn start_date(reference: Option<NaiveDateTime>, today: NaiveDate) -> NaiveDate {
        let yesterday = today - Days::new(1);
        match reference.and_then(|r| r.date().checked_add_days(Days::new(1))) {
            Some(after_reference) => yesterday.max(after_reference),
            None => yesterday,
        }
    }

    /// Walk back night by night until the evaluator accepts one.
    ///
    /// Returns the accepted night's snapshot, or an empty snapshot if no night
    /// within the lookback window passes.
    pub async fn find_last_good_night(
        &self,
        stations: &BTreeSet<StationId>,
        reference: Option<NaiveDateTime>,
        today: NaiveDate,
    ) -> StationSnapshot {
        if stations.is_empty() {
            warn!("no stations to search");
            return StationSnapshot::new();
        }

        let start = Self::start_date(reference, today);
        for offset in 0..self.max_lookback_days {
            let Some(date) = start.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };

            let snapshot = self.snapshot_for(stations, date).await;
            if snapshot.is_empty() {
                debug!(%date, "no capture directories for night");
                continue;
            }

            let counts = snapshot.counts_over(stations);
            let average = NightQualityEvaluator::average(&counts).unwrap_or(0.0);
            if self.evaluator.is_good(&counts) {
                info!(%date, average, stations = snapshot.len(), "found good night");
                return snapshot;
            }
            debug!(%date, average, min = self.evaluator.min_average, "night below threshold");
        }

        warn!(
            %start,
            lookback_days = self.max_lookback_days,
            "no good night within lookback window"
        );
        StationSnapshot::new()
    }

    /// Latest capture directory of every station, keeping only stations that
    /// actually captured something.
    pub async fn latest_directories(&self, stations: &BTreeSet<StationId>) -> StationSnapshot {
        let queries = stations.iter().map(|station| async move {
            match self.remote.latest_directory(station).await {
                Ok(Some(dir)) if dir.capture_count > 0 => Some((station.clone(), dir)),
                Ok(Some(dir)) => {
                    debug!(%station, directory = %dir.directory, "latest directory is empty");
                    None
                }
                Ok(None) => {
                    debug!(%station, "station has no capture directories");
                    None
                }
                Err(e) => {
                    warn!(%station, error = %e, "latest directory lookup failed");
                    None
                }
            }
        });
        join_all(queries).await.into_iter().flatten().collect()
    }

    /// One night's directories across the fleet. Stations are queried
    /// independently; a failing station is left out.
    async fn snapshot_for(&self, stations: &BTreeSet<StationId>, date: NaiveDate) -> StationSnapshot {
        let queries = stations.iter().map(|station| async move {
            match self.remote.directory_for_date(station, date).await {
                Ok(found) => found.map(|dir| (station.clone(), dir)),
                Err(e) => {
                    warn!(%station, %date, error = %e, timed_out = e.is_timeout(), "directory lookup failed");
                    None
                }
            }
        });
        join_all(queries).await.into_iter().flatten().collect()
    }
}
