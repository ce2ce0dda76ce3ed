//! camsync configuration

use cams_remote::RemoteConfig;
use cams_schedule::ScheduleConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CamsyncError, CamsyncResult};

/// Configuration file: how to reach the fleet, when to check, how to show.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CamsyncConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub slideshow: SlideshowConfig,
}

/// Display cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideshowConfig {
    /// Time each slide stays on screen in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    #[serde(default)]
    pub full_screen: bool,

    /// Display (monitor) index
    #[serde(default)]
    pub display: usize,

    /// Drawing area slides are fitted into
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_interval() -> u64 {
    5000
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            full_screen: false,
            display: 0,
            width: default_width(),
            height: default_height(),
        }
    }
}

impl CamsyncConfig {
    /// Load the configuration. A missing file yields the defaults.
    pub fn load(path: &Path) -> CamsyncResult<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CamsyncError::Config(format!("read {}: {e}", path.display())));
            }
        };
        serde_json::from_str(&data)
            .map_err(|e| CamsyncError::Config(format!("parse {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> CamsyncResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CamsyncConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.slideshow.interval_ms, 5000);
        assert_eq!(config.schedule.check_hour, 9);
        assert_eq!(config.remote.host, "pi@10.10.0.113");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camsync.json");
        std::fs::write(
            &path,
            r#"{"remote": {"host": "pi@station"}, "slideshow": {"full_screen": true}}"#,
        )
        .unwrap();

        let config = CamsyncConfig::load(&path).unwrap();
        assert_eq!(config.remote.host, "pi@station");
        assert!(config.slideshow.full_screen);
        assert_eq!(config.slideshow.interval_ms, 5000);
        assert_eq!(config.schedule.min_average_captures, 10.0);
    }

    #[test]
    fn test_unparseable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camsync.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CamsyncConfig::load(&path),
            Err(CamsyncError::Config(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/camsync.json");
        let mut config = CamsyncConfig::default();
        config.schedule.check_hour = 7;
        config.save(&path).unwrap();

        let loaded = CamsyncConfig::load(&path).unwrap();
        assert_eq!(loaded.schedule.check_hour, 7);
    }
}
