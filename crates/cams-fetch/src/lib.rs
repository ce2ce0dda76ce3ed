//! Fetch Orchestrator for camsync.
//!
//! Transfers the capture directories of one snapshot into a staging slot and
//! promotes the staging slot to the active working set with directory
//! renames. Three fixed slots sit next to each other:
//!
//! ```text
//! <root>/latest          staging, rebuilt by every fetch
//! <root>/<image_dir>     active working set, read by the display
//! <root>/<image_dir>_old backup of the previous working set
//! ```

#![forbid(unsafe_code)]

use cams_proto::{StationId, StationSnapshot};
use cams_remote::RemoteDirectoryService;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the staging slot.
pub const STAGING_DIR: &str = "latest";

/// Suffix appended to the active slot's name to form the backup slot.
pub const BACKUP_SUFFIX: &str = "_old";

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid working set directory {0}")]
    InvalidLayout(PathBuf),
}

pub type FetchResult<T> = Result<T, FetchError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FetchError + '_ {
    move |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ─── Layout ───────────────────────────────────────────────────────────────────

/// The three slots of the working set, derived from the active directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingSetLayout {
    staging: PathBuf,
    active: PathBuf,
    backup: PathBuf,
}

impl WorkingSetLayout {
    pub fn new(image_dir: impl Into<PathBuf>) -> FetchResult<Self> {
        let active: PathBuf = image_dir.into();
        let name = active
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| *n != STAGING_DIR && *n != "." && *n != "..")
            .ok_or_else(|| FetchError::InvalidLayout(active.clone()))?
            .to_string();

        let root = active.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self {
            staging: root.join(STAGING_DIR),
            backup: root.join(format!("{name}{BACKUP_SUFFIX}")),
            active,
        })
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    pub fn active(&self) -> &Path {
        &self.active
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Staging directory of one station.
    pub fn station_staging(&self, station: &StationId) -> PathBuf {
        self.staging.join(station.as_str())
    }

    /// Replace the active set with the staging slot.
    ///
    /// Drops the backup, moves active to backup (when there is one) and
    /// staging to active. The active path never holds partial data.
    pub fn promote(&self) -> FetchResult<()> {
        if self.backup.exists() {
            std::fs::remove_dir_all(&self.backup).map_err(io_err(&self.backup))?;
        }
        if self.active.exists() {
            std::fs::rename(&self.active, &self.backup).map_err(io_err(&self.active))?;
        }
        std::fs::rename(&self.staging, &self.active).map_err(io_err(&self.staging))?;
        info!(active = %self.active.display(), "switched to latest images");
        Ok(())
    }

    /// Remove the staging slot if present.
    pub fn discard_staging(&self) -> FetchResult<()> {
        match std::fs::remove_dir_all(&self.staging) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.staging)(e)),
        }
    }
}

// ─── Report ───────────────────────────────────────────────────────────────────

/// One station's completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedStation {
    pub directory: String,
    pub files: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Stations whose transfer produced capture files.
    pub per_station: BTreeMap<StationId, FetchedStation>,
    /// Whether staging replaced the active working set.
    pub promoted: bool,
}

impl FetchReport {
    /// Capture files transferred across all stations.
    pub fn total(&self) -> u64 {
        self.per_station.values().map(|s| u64::from(s.files)).sum()
    }

    /// Station → directory pairs of the completed transfers.
    pub fn fetched_dirs(&self) -> impl Iterator<Item = (StationId, String)> + '_ {
        self.per_station
            .iter()
            .map(|(station, fetched)| (station.clone(), fetched.directory.clone()))
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FetchOrchestrator {
    remote: Arc<dyn RemoteDirectoryService>,
    layout: WorkingSetLayout,
}

impl FetchOrchestrator {
    pub fn new(remote: Arc<dyn RemoteDirectoryService>, layout: WorkingSetLayout) -> Self {
        Self { remote, layout }
    }

    pub fn layout(&self) -> &WorkingSetLayout {
        &self.layout
    }

    /// Transfer every station of `snapshot` into staging and promote it when
    /// anything arrived.
    ///
    /// Station failures are logged and leave that station out. Only local
    /// filesystem errors around staging and promotion are returned.
    pub async fn fetch_all(&self, snapshot: &StationSnapshot) -> FetchResult<FetchReport> {
        let staging = self.layout.staging();
        if staging.exists() {
            warn!(staging = %staging.display(), "removing stale staging area");
        }
        self.layout.discard_staging()?;
        tokio::fs::create_dir_all(staging)
            .await
            .map_err(io_err(staging))?;

        let mut report = FetchReport::default();
        for (station, dir) in snapshot.iter() {
            let dest = self.layout.station_staging(station);
            match self
                .remote
                .fetch_directory(station, &dir.directory, &dest)
                .await
            {
                Ok(files) if files > 0 => {
                    info!(%station, directory = %dir.directory, files, "fetched capture directory");
                    report.per_station.insert(
                        station.clone(),
                        FetchedStation {
                            directory: dir.directory.clone(),
                            files,
                        },
                    );
                }
                Ok(_) => {
                    warn!(%station, directory = %dir.directory, "transfer produced no capture files");
                    remove_partial(&dest).await;
                }
                Err(e) => {
                    warn!(%station, directory = %dir.directory, error = %e, "transfer failed, excluding station");
                    remove_partial(&dest).await;
                }
            }
        }

        if report.total() == 0 {
            info!("nothing transferred, keeping current images");
            self.layout.discard_staging()?;
            return Ok(report);
        }

        self.layout.promote()?;
        report.promoted = true;
        info!(
            stations = report.per_station.len(),
            files = report.total(),
            "promoted new working set"
        );
        Ok(report)
    }
}

async fn remove_partial(dest: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dest).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(dest = %dest.display(), error = %e, "could not remove partial transfer");
    } else {
        debug!(dest = %dest.display(), "removed partial transfer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cams_proto::StationDir;
    use cams_remote::InMemoryFleet;

    fn snapshot(entries: &[(&str, &str, u32)]) -> StationSnapshot {
        entries
            .iter()
            .map(|(s, d, c)| (StationId::from(*s), StationDir::new(*d, *c)))
            .collect()
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    // ─── Layout ──────────────────────────────────────────────────────────────

    #[test]
    fn test_layout_slots_are_siblings() {
        let layout = WorkingSetLayout::new("/srv/cams/current").unwrap();
        assert_eq!(layout.staging(), Path::new("/srv/cams/latest"));
        assert_eq!(layout.active(), Path::new("/srv/cams/current"));
        assert_eq!(layout.backup(), Path::new("/srv/cams/current_old"));
    }

    #[test]
    fn test_layout_relative() {
        let layout = WorkingSetLayout::new("current").unwrap();
        assert_eq!(layout.staging(), Path::new("latest"));
        assert_eq!(layout.backup(), Path::new("current_old"));
    }

    #[test]
    fn test_layout_rejects_staging_name() {
        assert!(matches!(
            WorkingSetLayout::new("/srv/latest"),
            Err(FetchError::InvalidLayout(_))
        ));
        assert!(WorkingSetLayout::new("..").is_err());
    }

    #[test]
    fn test_promote_keeps_one_backup() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkingSetLayout::new(root.path().join("current")).unwrap();

        std::fs::create_dir_all(layout.backup()).unwrap();
        std::fs::write(layout.backup().join("ancient.png"), b"").unwrap();
        std::fs::create_dir_all(layout.active()).unwrap();
        std::fs::write(layout.active().join("old.png"), b"").unwrap();
        std::fs::create_dir_all(layout.staging()).unwrap();
        std::fs::write(layout.staging().join("new.png"), b"").unwrap();

        layout.promote().unwrap();

        assert!(!layout.staging().exists());
        assert_eq!(names(layout.active()), vec!["new.png"]);
        assert_eq!(names(layout.backup()), vec!["old.png"]);
    }

    #[test]
    fn test_promote_without_active() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkingSetLayout::new(root.path().join("current")).unwrap();
        std::fs::create_dir_all(layout.staging()).unwrap();

        layout.promote().unwrap();
        assert!(layout.active().is_dir());
        assert!(!layout.backup().exists());
    }

    // ─── Orchestrator ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fetch_all_promotes() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkingSetLayout::new(root.path().join("current")).unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("A", "A_20240309_180000_000001", 3)
            .add_directory("B", "B_20240309_180000_000001", 2);

        let orchestrator = FetchOrchestrator::new(fleet.clone(), layout.clone());
        let report = orchestrator
            .fetch_all(&snapshot(&[
                ("A", "A_20240309_180000_000001", 3),
                ("B", "B_20240309_180000_000001", 2),
            ]))
            .await
            .unwrap();

        assert!(report.promoted);
        assert_eq!(report.total(), 5);
        assert_eq!(names(layout.active()), vec!["A", "B"]);
        assert_eq!(names(&layout.active().join("A")).len(), 3);
        assert!(!layout.staging().exists());
    }

    #[tokio::test]
    async fn test_partial_failure_excludes_station() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkingSetLayout::new(root.path().join("current")).unwrap();
        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("A", "A_20240309_180000_000001", 3)
            .add_directory("B", "B_20240309_180000_000001", 2)
            .fail_fetch("B");

        let report = FetchOrchestrator::new(fleet.clone(), layout.clone())
            .fetch_all(&snapshot(&[
                ("A", "A_20240309_180000_000001", 3),
                ("B", "B_20240309_180000_000001", 2),
            ]))
            .await
            .unwrap();

        assert!(report.promoted);
        assert_eq!(report.per_station.len(), 1);
        assert!(report.per_station.contains_key("A"));
        assert_eq!(names(layout.active()), vec!["A"]);
    }

    #[tokio::test]
    async fn test_nothing_transferred_leaves_active_untouched() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkingSetLayout::new(root.path().join("current")).unwrap();
        std::fs::create_dir_all(layout.active()).unwrap();
        std::fs::write(layout.active().join("slide000_x.png"), b"").unwrap();

        let fleet = Arc::new(InMemoryFleet::new());
        fleet
            .add_directory("A", "A_20240309_180000_000001", 0)
            .fail_fetch("B");

        let report = FetchOrchestrator::new(fleet.clone(), layout.clone())
            .fetch_all(&snapshot(&[
                ("A", "A_20240309_180000_000001", 0),
                ("B", "B_20240309_180000_000001", 4),
            ]))
            .await
            .unwrap();

        assert!(!report.promoted);
        assert_eq!(report.total(), 0);
        assert_eq!(names(layout.active()), vec!["slide000_x.png"]);
        assert!(!layout.staging().exists());
        assert!(!layout.backup().exists());
    }

    #[tokio::test]
    async fn test_crash_before_promotion_keeps_active_set() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkingSetLayout::new(root.path().join("current")).unwrap();
        std::fs::create_dir_all(layout.active()).unwrap();
        std::fs::write(layout.active().join("slide000_x.png"), b"").unwrap();

        // a run that died after staging but before the renames
        std::fs::create_dir_all(layout.staging().join("A")).unwrap();
        std::fs::write(layout.staging().join("A").join("half.fits"), b"").unwrap();
        assert_eq!(names(layout.active()), vec!["slide000_x.png"]);

        // the next run starts from a clean staging area
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_directory("B", "B_20240310_180000_000001", 1);
        FetchOrchestrator::new(fleet.clone(), layout.clone())
            .fetch_all(&snapshot(&[("B", "B_20240310_180000_000001", 1)]))
            .await
            .unwrap();

        assert_eq!(names(layout.active()), vec!["B"]);
        assert_eq!(names(layout.backup()), vec!["slide000_x.png"]);
    }

    #[test]
    fn test_report_fetched_dirs() {
        let mut report = FetchReport::default();
        report.per_station.insert(
            StationId::from("A"),
            FetchedStation {
                directory: "A_20240309_180000_000001".to_string(),
                files: 7,
            },
        );
        let dirs: Vec<_> = report.fetched_dirs().collect();
        assert_eq!(
            dirs,
            vec![(StationId::from("A"), "A_20240309_180000_000001".to_string())]
        );
        assert_eq!(report.total(), 7);
    }
}
