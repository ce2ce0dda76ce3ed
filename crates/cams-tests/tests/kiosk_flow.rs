//! End-to-end flows across the camsync crates:
//! - Good night on the fleet → fetch, promotion, slides, captions
//! - Daily gating and backup rotation over consecutive days
//! - Restart after a crash between promotion and conversion
//! - Legacy single-directory state files

use cams_convert::{FitsDecoder, list_slides};
use cams_persist::JsonStore;
use cams_proto::{PersistedState, StationId};
use cams_remote::InMemoryFleet;
use cams_schedule::{ScheduleConfig, Scheduler, Settlement};
use cams_tests::add_night;
use camsync::display::{Renderer, Slide};
use camsync::{CamsyncResult, Slideshow};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn scheduler(root: &Path, fleet: &Arc<InMemoryFleet>) -> Scheduler {
    let config = ScheduleConfig {
        data_root: root.to_path_buf(),
        ..Default::default()
    };
    Scheduler::new(config, fleet.clone(), Arc::new(FitsDecoder::default()))
}

fn stored_state(root: &Path) -> PersistedState {
    JsonStore::new(root.join("latest_state.json")).load()
}

#[derive(Clone, Default)]
struct Captions(Arc<Mutex<Vec<String>>>);

impl Renderer for Captions {
    fn area(&self) -> (u32, u32) {
        (1920, 1080)
    }

    fn show(&mut self, slide: &Slide) -> CamsyncResult<()> {
        self.0.lock().push(slide.caption.clone());
        Ok(())
    }
}

// ─── Flows ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_good_night_becomes_slides() {
    let root = tempfile::tempdir().unwrap();
    let fleet = Arc::new(InMemoryFleet::new());
    add_night(&fleet, "BE000D", "BE000D_20240309_175512_123456", 12);
    add_night(&fleet, "NL0001", "NL0001_20240309_180102_654321", 10);

    let mut sched = scheduler(root.path(), &fleet);
    let report = sched.check_at(at(10, 9, 15)).await;

    assert_eq!(report.settlement, Settlement::Updated);
    assert!(report.new_data_found());
    assert!(!report.used_latest);
    assert_eq!(report.fetch.as_ref().map(|f| f.total()), Some(22));
    let conversion = report.conversion.unwrap();
    assert_eq!((conversion.converted, conversion.failed), (22, 0));

    let current = root.path().join("current");
    let slides = list_slides(&current).unwrap();
    assert_eq!(slides.len(), 22);
    assert!(current.join("BE000D").is_dir());
    assert!(!root.path().join("latest").exists());

    let first = image::open(&slides[0]).unwrap();
    assert_eq!((first.width(), first.height()), (8, 4));

    // chronological across stations: both start at 22:00
    let names: Vec<String> = slides
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(names[0].starts_with("slide000_20240309_220000_"));
    assert!(names[0].ends_with("_BE000D.png"));
    assert!(names[1].starts_with("slide001_20240309_220000_"));
    assert!(names[1].ends_with("_NL0001.png"));

    let state = stored_state(root.path());
    assert_eq!(state.active_stations.len(), 2);
    assert_eq!(
        state.last_dirs.get("NL0001").map(String::as_str),
        Some("NL0001_20240309_180102_654321")
    );
    assert_eq!(state.last_check, Some(at(10, 9, 15)));
    assert_eq!(state.last_switch, Some(at(10, 9, 15)));
}

#[tokio::test]
async fn test_consecutive_days_rotate_backup() {
    let root = tempfile::tempdir().unwrap();
    let fleet = Arc::new(InMemoryFleet::new());
    add_night(&fleet, "BE000D", "BE000D_20240309_175512_123456", 15);

    let mut sched = scheduler(root.path(), &fleet);
    assert_eq!(
        sched.check_at(at(10, 9, 0)).await.settlement,
        Settlement::Updated
    );

    // same day again: nothing happens
    fleet.clear_calls();
    assert_eq!(
        sched.check_at(at(10, 18, 0)).await.settlement,
        Settlement::NotDue
    );
    assert!(fleet.calls().is_empty());

    // next day, no new night yet
    assert_eq!(
        sched.check_at(at(11, 9, 0)).await.settlement,
        Settlement::NoNewData
    );

    // a new night arrives
    add_night(&fleet, "BE000D", "BE000D_20240311_175201_000001", 11);
    let report = sched.check_at(at(12, 9, 0)).await;
    assert_eq!(report.settlement, Settlement::Updated);

    let old = root.path().join("current_old");
    assert_eq!(list_slides(&old).unwrap().len(), 15);
    assert_eq!(list_slides(&root.path().join("current")).unwrap().len(), 11);
    assert_eq!(
        stored_state(root.path())
            .last_dirs
            .get("BE000D")
            .map(String::as_str),
        Some("BE000D_20240311_175201_000001")
    );
}

#[tokio::test]
async fn test_restart_converts_promoted_working_set() {
    let root = tempfile::tempdir().unwrap();
    let fleet = Arc::new(InMemoryFleet::new());
    add_night(&fleet, "BE000D", "BE000D_20240309_175512_123456", 12);

    // promotion happened, conversion never ran
    let station = root.path().join("current").join("BE000D");
    std::fs::create_dir_all(&station).unwrap();
    let bytes = cams_tests::capture_fits(8, 4, &[500; 32]);
    for minute in 0..3 {
        std::fs::write(
            station.join(format!("FF_BE000D_20240309_22{minute:02}00_000_0000001.fits")),
            &bytes,
        )
        .unwrap();
    }
    // and a half-finished transfer was left in staging
    std::fs::create_dir_all(root.path().join("latest").join("BE000D")).unwrap();

    let captions = Captions::default();
    let mut show = Slideshow::new(scheduler(root.path(), &fleet), Box::new(captions.clone()));
    show.prepare().await.unwrap();
    assert_eq!(show.deck().len(), 3);
    assert!(fleet.calls().is_empty());

    // the next due check replaces the working set and clears staging
    show.tick_at(at(10, 9, 0)).await;
    assert_eq!(show.deck().len(), 12);
    assert!(!root.path().join("latest").exists());
    assert_eq!(
        captions.0.lock().first().map(String::as_str),
        Some("(1/12) 9 maart 2024 om 22:00")
    );
}

#[tokio::test]
async fn test_legacy_state_file_is_upgraded() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(
        root.path().join("latest_state.json"),
        r#"{"last_dir": "BE000D_20240301_180000_000001", "last_switch": "2024-03-02T09:00:00", "image_dir": "current"}"#,
    )
    .unwrap();
    let fleet = Arc::new(InMemoryFleet::new());
    add_night(&fleet, "BE000D", "BE000D_20240301_180000_000001", 4);

    let mut sched = scheduler(root.path(), &fleet);
    assert!(sched.state().is_first_run());
    assert_eq!(sched.state().last_switch, Some(at(2, 9, 0)));

    // no active stations yet, so even a poor night is fetched
    let report = sched.check_at(at(10, 9, 0)).await;
    assert_eq!(report.settlement, Settlement::Updated);
    assert!(report.used_latest);
    assert!(!report.new_data_found());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(root.path().join("latest_state.json")).unwrap())
            .unwrap();
    assert_eq!(raw["last_check"], "2024-03-10T09:00:00");
    assert_eq!(raw["active_stations"], serde_json::json!(["BE000D"]));

    let state = stored_state(root.path());
    assert!(state.active_stations.contains(&StationId::from("BE000D")));
}
