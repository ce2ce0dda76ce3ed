//! Remote Directory Service for the camsync station fleet.
//!
//! The scheduling core never talks to stations directly. It goes through the
//! [`RemoteDirectoryService`] trait, which lists stations, inspects their
//! capture directories and transfers them. Two implementations ship here:
//! [`SshDirectoryService`] (ssh + rsync with hard timeouts) and
//! [`InMemoryFleet`] (deterministic, with failure injection).

#![forbid(unsafe_code)]

pub mod memory;
pub mod ssh;

use async_trait::async_trait;
use cams_proto::{CAPTURE_EXTENSION, StationDir, StationId};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use memory::{InMemoryFleet, PingBehavior, RemoteCall};
pub use ssh::{RemoteConfig, SshDirectoryService};

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("{operation} failed: {message}")]
    Command { operation: String, message: String },

    #[error("unexpected reply to {operation}: {message}")]
    Protocol { operation: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

// ─── Service trait ────────────────────────────────────────────────────────────

/// Capabilities the scheduler needs from the remote fleet.
///
/// Every call may fail on its own. Implementations must bound each call with a
/// timeout and report it as [`RemoteError::Timeout`] instead of hanging.
#[async_trait]
pub trait RemoteDirectoryService: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// One minimal round-trip to the fleet's entry point. `Ok` only on an
    /// explicit success reply.
    async fn ping(&self) -> RemoteResult<()>;

    async fn list_stations(&self) -> RemoteResult<BTreeSet<StationId>>;

    /// Most recent capture directory of a station, if it has any.
    async fn latest_directory(&self, station: &StationId) -> RemoteResult<Option<StationDir>>;

    /// Capture directory of a station for the night starting on `date`.
    async fn directory_for_date(
        &self,
        station: &StationId,
        date: NaiveDate,
    ) -> RemoteResult<Option<StationDir>>;

    /// Transfer the capture files of `directory` into `dest`. Returns the
    /// number of capture files present in `dest` afterwards.
    async fn fetch_directory(
        &self,
        station: &StationId,
        directory: &str,
        dest: &Path,
    ) -> RemoteResult<u32>;
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Whether a file name looks like a capture file.
pub fn is_capture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CAPTURE_EXTENSION))
}

/// Count capture files directly inside `dir`.
pub fn count_local_captures(dir: &Path) -> std::io::Result<u32> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && is_capture_file(&entry.path()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Directory names come from the remote side; refuse anything that could
/// escape the archive root or the staging area.
pub(crate) fn check_directory_name(operation: &str, directory: &str) -> RemoteResult<()> {
    if directory.is_empty()
        || directory.contains('/')
        || directory.contains('\\')
        || directory == "."
        || directory == ".."
    {
        return Err(RemoteError::Protocol {
            operation: operation.to_string(),
            message: format!("refusing directory name {directory:?}"),
        });
    }
    Ok(())
}
