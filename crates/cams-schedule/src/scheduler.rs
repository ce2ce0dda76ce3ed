//! The check routine.
//!
//! One [`Scheduler`] owns the persisted state for the life of the process.
//! Each check walks the phases of [`CheckPhase`] once and ends by bringing
//! the state file in line with the in-memory state.

use crate::policy::{ProbeGate, check_due, decide_fetch, probe_gate};
use crate::{CheckPhase, CheckReport, ScheduleConfig, ScheduleError, ScheduleResult, Settlement};
use cams_convert::{ConversionSummary, FrameDecoder, convert_all};
use cams_fetch::{FetchOrchestrator, FetchReport, WorkingSetLayout};
use cams_health::{AvailabilityProber, GoodNightSearch, NightQualityEvaluator};
use cams_persist::JsonStore;
use cams_proto::{PersistedState, StationId, StationSnapshot};
use cams_remote::RemoteDirectoryService;
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct Scheduler {
    config: ScheduleConfig,
    remote: Arc<dyn RemoteDirectoryService>,
    decoder: Arc<dyn FrameDecoder>,
    prober: AvailabilityProber,
    search: GoodNightSearch,
    store: JsonStore,
    state: PersistedState,
    /// Last state written to (or read from) the store.
    saved: PersistedState,
}

impl Scheduler {
    /// Build a scheduler and load its state from the configured state file.
    pub fn new(
        config: ScheduleConfig,
        remote: Arc<dyn RemoteDirectoryService>,
        decoder: Arc<dyn FrameDecoder>,
    ) -> Self {
        let store = JsonStore::new(config.resolve(&config.state_file));
        let state: PersistedState = store.load();
        info!(
            state_file = %store.path().display(),
            image_dir = %state.image_dir.display(),
            active_stations = state.active_stations.len(),
            "loaded scheduling state"
        );

        let prober = AvailabilityProber::new(
            remote.clone(),
            config.retry_policy(),
            config.probe_timeout(),
        );
        let search = GoodNightSearch::new(
            remote.clone(),
            NightQualityEvaluator::new(config.min_average_captures),
            config.max_lookback_days,
        );

        Self {
            saved: state.clone(),
            config,
            remote,
            decoder,
            prober,
            search,
            store,
            state,
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    /// Active working set directory.
    pub fn image_dir(&self) -> PathBuf {
        self.config.resolve(&self.state.image_dir)
    }

    /// Point the active working set somewhere else. Takes effect for the next
    /// fetch and is persisted with the next state write.
    pub fn set_image_dir(&mut self, dir: impl Into<PathBuf>) {
        self.state.image_dir = dir.into();
    }

    // ─── Check ───────────────────────────────────────────────────────────────

    /// Run one check at the current local time.
    pub async fn check(&mut self) -> CheckReport {
        self.check_at(Local::now().naive_local()).await
    }

    /// Run one check as if the local time were `now`.
    pub async fn check_at(&mut self, now: NaiveDateTime) -> CheckReport {
        let cycle = Uuid::new_v4();
        let span = info_span!("check", %cycle);
        self.run_check(now, CheckReport::new(cycle))
            .instrument(span)
            .await
    }

    async fn run_check(&mut self, now: NaiveDateTime, mut report: CheckReport) -> CheckReport {
        if !check_due(&self.state, now, self.config.check_hour) {
            return report.settle(Settlement::NotDue);
        }
        report.enter(CheckPhase::CheckDue);
        info!(%now, last_check = ?self.state.last_check, "daily check due");

        match probe_gate(&self.state, now, self.config.probe_interval()) {
            ProbeGate::Probe => {
                report.enter(CheckPhase::Probing);
                let ok = self.prober.probe_default().await;
                self.state.last_server_check = Some(now);
                self.state.last_server_ok = ok;
                if !ok {
                    self.persist();
                    return report.settle(Settlement::ServerUnavailable);
                }
            }
            ProbeGate::AssumeAvailable => {
                debug!(last_probe = ?self.state.last_server_check, "recent probe succeeded, skipping probe");
            }
            ProbeGate::AssumeUnavailable => {
                debug!(last_probe = ?self.state.last_server_check, "recent probe failed, deferring check");
                self.persist();
                return report.settle(Settlement::ServerUnavailable);
            }
        }

        report.enter(CheckPhase::Searching);
        let stations = self.discover_stations().await;
        let mut snapshot = self
            .search
            .find_last_good_night(&stations, self.state.last_check, now.date())
            .await;
        if snapshot.is_empty() {
            info!("no good night found, falling back to latest directories");
            snapshot = self.search.latest_directories(&stations).await;
            report.used_latest = true;
        }

        report.enter(CheckPhase::Deciding);
        let decision = decide_fetch(&self.state, &snapshot, &stations, self.search.evaluator());
        report.decision = Some(decision);
        report.snapshot = snapshot.clone();

        if !decision.should_fetch() {
            info!(
                novel = decision.novel,
                good = decision.good,
                stations = snapshot.len(),
                "no new data to fetch"
            );
            self.state.last_check = Some(now);
            self.persist();
            return report.settle(Settlement::NoNewData);
        }
        if decision.is_first_run_override() {
            info!(good = decision.good, "first run, fetching regardless of quality");
        }

        let settlement = self.fetch_and_convert(&snapshot, now, &mut report).await;
        self.state.last_check = Some(now);
        self.persist();
        report.settle(settlement)
    }

    // ─── Forced fetch ────────────────────────────────────────────────────────

    /// Fetch the latest directory of every station right away, bypassing the
    /// daily gate, the probe and the quality checks.
    pub async fn force_fetch(&mut self, now: NaiveDateTime) -> CheckReport {
        let cycle = Uuid::new_v4();
        let span = info_span!("fetch", %cycle);
        async move {
            let mut report = CheckReport::new(cycle);
            report.enter(CheckPhase::Searching);
            let stations = self.discover_stations().await;
            let snapshot = self.search.latest_directories(&stations).await;
            report.used_latest = true;

            report.enter(CheckPhase::Deciding);
            report.decision = Some(decide_fetch(
                &self.state,
                &snapshot,
                &stations,
                self.search.evaluator(),
            ));
            report.snapshot = snapshot.clone();
            if snapshot.is_empty() {
                warn!("no station has capture directories, nothing to fetch");
                return report.settle(Settlement::NoNewData);
            }

            let settlement = self.fetch_and_convert(&snapshot, now, &mut report).await;
            self.persist();
            report.settle(settlement)
        }
        .instrument(span)
        .await
    }

    // ─── Good-night report ───────────────────────────────────────────────────

    /// Probe, discover and search without fetching or touching the state.
    /// The search always starts at yesterday's night.
    pub async fn report_good_night(&self, now: NaiveDateTime) -> ScheduleResult<StationSnapshot> {
        if !self.prober.probe_default().await {
            return Err(ScheduleError::ServerUnavailable);
        }
        let stations = self.discover_stations().await;
        Ok(self
            .search
            .find_last_good_night(&stations, None, now.date())
            .await)
    }

    // ─── Conversion ──────────────────────────────────────────────────────────

    /// Convert whatever in the active working set is not converted yet.
    pub async fn convert_working_set(&self) -> ScheduleResult<ConversionSummary> {
        let dir = self.image_dir();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no working set to convert");
            return Ok(ConversionSummary::default());
        }
        let decoder = self.decoder.clone();
        let summary =
            tokio::task::spawn_blocking(move || convert_all(&dir, decoder.as_ref())).await??;
        Ok(summary)
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Remote list, else the last active stations, else the configured set.
    async fn discover_stations(&self) -> BTreeSet<StationId> {
        match self.remote.list_stations().await {
            Ok(stations) if !stations.is_empty() => {
                debug!(count = stations.len(), "discovered stations");
                return stations;
            }
            Ok(_) => warn!("station discovery returned nothing"),
            Err(e) => warn!(error = %e, "station discovery failed"),
        }

        if !self.state.active_stations.is_empty() {
            info!(stations = ?self.state.active_stations, "using last active stations");
            return self.state.active_stations.clone();
        }
        info!(stations = ?self.config.fallback_stations, "using fallback stations");
        self.config.fallback_stations.iter().cloned().collect()
    }

    async fn fetch_and_convert(
        &mut self,
        snapshot: &StationSnapshot,
        now: NaiveDateTime,
        report: &mut CheckReport,
    ) -> Settlement {
        report.enter(CheckPhase::Fetching);
        let fetch = match self.fetch(snapshot).await {
            Ok(fetch) => fetch,
            Err(e) => {
                error!(error = %e, "fetch failed, keeping current images");
                return Settlement::NothingTransferred;
            }
        };
        let promoted = fetch.promoted;
        if promoted {
            self.state.record_fetch(fetch.fetched_dirs(), now);
        }
        report.fetch = Some(fetch);
        if !promoted {
            return Settlement::NothingTransferred;
        }

        report.enter(CheckPhase::Converting);
        match self.convert_working_set().await {
            Ok(summary) => report.conversion = Some(summary),
            Err(e) => error!(error = %e, "conversion failed"),
        }
        Settlement::Updated
    }

    async fn fetch(&self, snapshot: &StationSnapshot) -> ScheduleResult<FetchReport> {
        let layout = WorkingSetLayout::new(self.image_dir())?;
        let orchestrator = FetchOrchestrator::new(self.remote.clone(), layout);
        Ok(orchestrator.fetch_all(snapshot).await?)
    }

    /// Write the state if it changed since the last write. A failed write is
    /// logged; the in-memory state stays authoritative.
    fn persist(&mut self) {
        if self.state == self.saved {
            return;
        }
        match self.store.save(&self.state) {
            Ok(()) => self.saved = self.state.clone(),
            Err(e) => error!(path = %self.store.path().display(), error = %e, "could not save state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cams_convert::{ConvertResult, Frame};
    use cams_remote::{InMemoryFleet, PingBehavior, RemoteCall};
    use chrono::NaiveDate;
    use std::path::Path;

    #[derive(Debug)]
    struct FlatDecoder;

    impl FrameDecoder for FlatDecoder {
        fn decode(&self, _: &Path) -> ConvertResult<Frame> {
            Frame::new(2, 2, vec![0.0, 1.0, 2.0, 3.0])
        }
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn config(root: &Path) -> ScheduleConfig {
        ScheduleConfig {
            data_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    fn scheduler(root: &Path, fleet: &Arc<InMemoryFleet>) -> Scheduler {
        Scheduler::new(config(root), fleet.clone(), Arc::new(FlatDecoder))
    }

    fn write_state(root: &Path, state: &PersistedState) {
        JsonStore::new(root.join("latest_state.json"))
            .save(state)
            .unwrap();
    }

    fn read_state(root: &Path) -> PersistedState {
        JsonStore::new(root.join("latest_state.json")).load()
    }

    fn active_state(dirs: &[(&str, &str)], last_check: NaiveDateTime) -> PersistedState {
        let mut state = PersistedState::default();
        state.record_fetch(
            dirs.iter()
                .map(|(s, d)| (StationId::from(*s), d.to_string())),
            last_check,
        );
        state.last_check = Some(last_check);
        state
    }

    // ─── Gating ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_checked_today_makes_no_remote_calls() {
        let root = tempfile::tempdir().unwrap();
        let state = active_state(&[("A", "A_20240308_180000_000001")], at(10, 9, 1));
        write_state(root.path(), &state);
        let fleet = Arc::new(InMemoryFleet::new());

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 15, 0)).await;

        assert_eq!(report.settlement, Settlement::NotDue);
        assert!(!report.new_data_found());
        assert!(fleet.calls().is_empty());
        assert_eq!(sched.state(), &state);
    }

    #[tokio::test]
    async fn test_checked_yesterday_proceeds_after_check_hour() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("A", "A_20240308_180000_000001")], at(9, 9, 0)),
        );
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("A", "A_20240308_180000_000001", 30);

        let mut sched = scheduler(root.path(), &fleet);
        assert_eq!(
            sched.check_at(at(10, 8, 59)).await.settlement,
            Settlement::NotDue
        );
        assert!(fleet.calls().is_empty());

        let report = sched.check_at(at(10, 9, 0)).await;
        assert_eq!(fleet.calls().first(), Some(&RemoteCall::Ping));
        assert!(report.phases.contains(&CheckPhase::Searching));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_records_only_probe_time() {
        let root = tempfile::tempdir().unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .set_ping(PingBehavior::Refused)
            .add_directory("A", "A_20240309_180000_000001", 30);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 30)).await;

        assert_eq!(report.settlement, Settlement::ServerUnavailable);
        assert!(fleet.calls().iter().all(|c| *c == RemoteCall::Ping));
        assert_eq!(fleet.calls().len(), 4);

        let persisted = read_state(root.path());
        assert_eq!(persisted.last_server_check, Some(at(10, 9, 30)));
        assert!(!persisted.last_server_ok);
        assert_eq!(persisted.last_check, None);
        assert!(persisted.active_stations.is_empty());
        assert!(persisted.last_dirs.is_empty());
    }

    #[tokio::test]
    async fn test_recent_failed_probe_defers_without_calls() {
        let root = tempfile::tempdir().unwrap();
        let state = PersistedState {
            last_server_check: Some(at(10, 9, 0)),
            last_server_ok: false,
            ..Default::default()
        };
        write_state(root.path(), &state);
        let fleet = Arc::new(InMemoryFleet::new());

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 40)).await;

        assert_eq!(report.settlement, Settlement::ServerUnavailable);
        assert!(fleet.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recent_successful_probe_skips_ping() {
        let root = tempfile::tempdir().unwrap();
        let state = PersistedState {
            last_server_check: Some(at(10, 9, 0)),
            last_server_ok: true,
            ..Default::default()
        };
        write_state(root.path(), &state);
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("A", "A_20240309_180000_000001", 30);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 40)).await;

        assert_eq!(report.settlement, Settlement::Updated);
        assert!(!fleet.calls().contains(&RemoteCall::Ping));
        assert!(!report.phases.contains(&CheckPhase::Probing));
    }

    // ─── Decisions ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_good_novel_night_is_fetched_and_converted() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("A", "A_20240301_180000_000001")], at(2, 9, 0)),
        );
        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("A", "A_20240309_180000_000001", 12)
            .add_directory("B", "B_20240309_180000_000001", 10);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 15)).await;

        assert_eq!(report.settlement, Settlement::Updated);
        assert!(report.new_data_found());
        assert!(report.data_changed());
        assert!(!report.used_latest);
        assert_eq!(report.conversion.unwrap().converted, 22);

        let slides = cams_convert::list_slides(&root.path().join("current")).unwrap();
        assert_eq!(slides.len(), 22);
        assert!(!root.path().join("current_old").exists());

        let persisted = read_state(root.path());
        assert_eq!(persisted.last_check, Some(at(10, 9, 15)));
        assert_eq!(persisted.last_switch, Some(at(10, 9, 15)));
        assert_eq!(persisted.active_stations.len(), 2);
        assert_eq!(
            persisted.last_dirs.get("B").map(String::as_str),
            Some("B_20240309_180000_000001")
        );
    }

    #[tokio::test]
    async fn test_known_directories_are_not_refetched() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("A", "A_20240309_180000_000001")], at(9, 9, 0)),
        );
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("A", "A_20240309_180000_000001", 40);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 0)).await;

        assert_eq!(report.settlement, Settlement::NoNewData);
        assert!(!report.data_changed());
        assert!(
            !fleet
                .calls()
                .iter()
                .any(|c| matches!(c, RemoteCall::Fetch(..)))
        );
        assert_eq!(read_state(root.path()).last_check, Some(at(10, 9, 0)));
    }

    #[tokio::test]
    async fn test_first_run_fetches_poor_data() {
        let root = tempfile::tempdir().unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("A", "A_20240309_180000_000001", 3);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 0)).await;

        assert_eq!(report.settlement, Settlement::Updated);
        assert!(report.used_latest);
        assert!(report.data_changed());
        assert!(!report.new_data_found());

        let state = sched.state();
        assert!(state.active_stations.contains("A"));
        assert_eq!(
            state.last_dirs.get("A").map(String::as_str),
            Some("A_20240309_180000_000001")
        );
    }

    #[tokio::test]
    async fn test_poor_data_after_first_run_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("A", "A_20240301_180000_000001")], at(2, 9, 0)),
        );
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("A", "A_20240309_180000_000001", 3);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 0)).await;

        assert_eq!(report.settlement, Settlement::NoNewData);
        assert!(report.used_latest);
        assert!(report.decision.unwrap().novel);
        assert!(!report.decision.unwrap().good);
    }

    #[tokio::test]
    async fn test_failed_transfers_leave_state_and_images() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("A", "A_20240301_180000_000001")], at(2, 9, 0)),
        );
        std::fs::create_dir_all(root.path().join("current")).unwrap();
        std::fs::write(root.path().join("current/slide000_x_A.png"), b"").unwrap();

        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("A", "A_20240309_180000_000001", 30)
            .fail_fetch("A");

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 0)).await;

        assert_eq!(report.settlement, Settlement::NothingTransferred);
        assert!(!report.data_changed());
        assert!(root.path().join("current/slide000_x_A.png").exists());
        assert!(!root.path().join("latest").exists());

        let persisted = read_state(root.path());
        assert_eq!(persisted.last_check, Some(at(10, 9, 0)));
        assert_eq!(
            persisted.last_dirs.get("A").map(String::as_str),
            Some("A_20240301_180000_000001")
        );
    }

    // ─── Discovery ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_discovery_failure_uses_active_stations() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("NL0001", "NL0001_20240301_180000_000001")], at(2, 9, 0)),
        );
        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("NL0001", "NL0001_20240309_180000_000001", 20)
            .add_directory("BE000D", "BE000D_20240309_180000_000001", 20)
            .fail_discovery(true);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 0)).await;

        assert_eq!(report.settlement, Settlement::Updated);
        assert_eq!(report.snapshot.len(), 1);
        assert!(report.snapshot.get("NL0001").is_some());
    }

    #[tokio::test]
    async fn test_discovery_failure_on_first_run_uses_fallback() {
        let root = tempfile::tempdir().unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("BE000D", "BE000D_20240309_180000_000001", 20)
            .add_directory("NL0001", "NL0001_20240309_180000_000001", 20)
            .fail_discovery(true);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.check_at(at(10, 9, 0)).await;

        assert_eq!(report.settlement, Settlement::Updated);
        assert_eq!(
            report.snapshot.stations().cloned().collect::<Vec<_>>(),
            vec![StationId::from("BE000D")]
        );
    }

    // ─── Forced fetch / report ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_force_fetch_takes_latest_directories() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("A", "A_20240309_180000_000001")], at(10, 9, 0)),
        );
        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("A", "A_20240309_180000_000001", 2)
            .add_directory("A", "A_20240310_180000_000001", 1);

        let mut sched = scheduler(root.path(), &fleet);
        let report = sched.force_fetch(at(10, 21, 0)).await;

        assert_eq!(report.settlement, Settlement::Updated);
        assert!(!fleet.calls().contains(&RemoteCall::Ping));
        let persisted = read_state(root.path());
        assert_eq!(
            persisted.last_dirs.get("A").map(String::as_str),
            Some("A_20240310_180000_000001")
        );
        assert_eq!(persisted.last_switch, Some(at(10, 21, 0)));
        assert_eq!(persisted.last_check, Some(at(10, 9, 0)));
    }

    #[tokio::test]
    async fn test_report_good_night_leaves_state_alone() {
        let root = tempfile::tempdir().unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("A", "A_20240308_180000_000001", 50);

        let sched = scheduler(root.path(), &fleet);
        let found = sched.report_good_night(at(10, 12, 0)).await.unwrap();

        assert_eq!(
            found.get("A").map(|d| d.directory.as_str()),
            Some("A_20240308_180000_000001")
        );
        assert_eq!(sched.state(), &PersistedState::default());
        assert!(!root.path().join("latest_state.json").exists());
    }

    #[tokio::test]
    async fn test_report_good_night_after_todays_check_starts_yesterday() {
        let root = tempfile::tempdir().unwrap();
        write_state(
            root.path(),
            &active_state(&[("A", "A_20240309_180000_000001")], at(10, 9, 0)),
        );
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("A", "A_20240309_180000_000001", 50);

        let sched = scheduler(root.path(), &fleet);
        let found = sched.report_good_night(at(10, 12, 0)).await.unwrap();

        assert_eq!(
            fleet.queried_dates(),
            vec![NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()]
        );
        assert_eq!(found.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_good_night_unreachable() {
        let root = tempfile::tempdir().unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.set_ping(PingBehavior::Refused);

        let sched = scheduler(root.path(), &fleet);
        assert!(matches!(
            sched.report_good_night(at(10, 12, 0)).await,
            Err(ScheduleError::ServerUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_convert_working_set_without_images() {
        let root = tempfile::tempdir().unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        let sched = scheduler(root.path(), &fleet);
        assert_eq!(
            sched.convert_working_set().await.unwrap(),
            ConversionSummary::default()
        );
    }
}
