//! camsync error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CamsyncError {
    #[error("config error: {0}")]
    Config(String),

    #[error("not a directory: {}", .0.display())]
    InvalidImageDir(PathBuf),

    #[error("display error: {0}")]
    Display(String),

    #[error(transparent)]
    Schedule(#[from] cams_schedule::ScheduleError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CamsyncResult<T> = Result<T, CamsyncError>;
