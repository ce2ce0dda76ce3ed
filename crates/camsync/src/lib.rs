//! camsync — meteor camera slideshow kiosk
//!
//! Pulls the last good night of captures from the station fleet once a day,
//! converts them to slides and cycles them on screen.

#![forbid(unsafe_code)]

pub mod config;
pub mod display;
pub mod error;
pub mod slideshow;

use cams_convert::FitsDecoder;
use cams_remote::SshDirectoryService;
use cams_schedule::Scheduler;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use config::{CamsyncConfig, SlideshowConfig};
pub use display::{LogRenderer, Renderer, SlideDeck};
pub use error::{CamsyncError, CamsyncResult};
pub use slideshow::Slideshow;

/// Absolute form of an explicit image directory, resolved against the
/// current directory. Anything that is not an existing directory is rejected.
pub fn resolve_image_dir(dir: &Path) -> CamsyncResult<PathBuf> {
    std::fs::canonicalize(dir)
        .ok()
        .filter(|resolved| resolved.is_dir())
        .ok_or_else(|| CamsyncError::InvalidImageDir(dir.to_path_buf()))
}

/// Scheduler wired to the ssh fleet and the FITS decoder.
pub fn build_scheduler(config: &CamsyncConfig) -> Scheduler {
    let remote = Arc::new(SshDirectoryService::new(config.remote.clone()));
    let decoder = Arc::new(FitsDecoder::new(config.schedule.frame_hdu));
    Scheduler::new(config.schedule.clone(), remote, decoder)
}
