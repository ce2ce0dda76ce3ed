//! Frame conversion for camsync.
//!
//! Turns the capture files of a promoted working set into PNG slides. Each
//! station's captures live in `<working set>/<station>/`; slides are written
//! to the working set root as `slide<NNN>_<capture timestamp>_<station>.png`,
//! numbered chronologically across all stations.

#![forbid(unsafe_code)]

pub mod fits;

use cams_proto::StationId;
use cams_remote::is_capture_file;
use image::{GrayImage, ImageFormat, Luma};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use fits::FitsDecoder;

/// File name prefix of every slide.
pub const SLIDE_PREFIX: &str = "slide";

/// File extension of every slide.
pub const SLIDE_EXTENSION: &str = "png";

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed frame: {0}")]
    Format(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type ConvertResult<T> = Result<T, ConvertError>;

// ─── Frames ───────────────────────────────────────────────────────────────────

/// One decoded sensor frame in physical units, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<f32>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> ConvertResult<Self> {
        if width == 0 || height == 0 {
            return Err(ConvertError::Format(format!("empty frame {width}x{height}")));
        }
        if pixels.len() != width as usize * height as usize {
            return Err(ConvertError::Format(format!(
                "{} pixels for a {width}x{height} frame",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Linear stretch of the finite value range onto 0..=255. A flat frame
    /// maps to black; non-finite values map to black.
    pub fn to_grayscale(&self) -> GrayImage {
        let (min, max) = self
            .pixels
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        GrayImage::from_fn(self.width, self.height, |x, y| {
            let v = self.pixels[(y * self.width + x) as usize];
            let level = if v.is_finite() && range > 0.0 {
                ((v - min) / range * 255.0).round() as u8
            } else {
                0
            };
            Luma([level])
        })
    }
}

/// Decodes one capture file into a frame.
pub trait FrameDecoder: Send + Sync + std::fmt::Debug {
    fn decode(&self, path: &Path) -> ConvertResult<Frame>;
}

// ─── Slide naming ─────────────────────────────────────────────────────────────

/// Capture timestamp part of a capture file name.
///
/// `FF_BE000D_20231014_021113_363_0776192.fits` → `20231014_021113_363_0776192`.
/// Names without the station marker fall back to their stem.
pub fn capture_timestamp(capture: &Path, station: &StationId) -> String {
    let stem = capture
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let marker = format!("{station}_");
    match stem.find(&marker) {
        Some(at) => stem[at + marker.len()..].to_string(),
        None => stem,
    }
}

pub fn slide_name(number: usize, timestamp: &str, station: &StationId) -> String {
    format!("{SLIDE_PREFIX}{number:03}_{timestamp}_{station}.{SLIDE_EXTENSION}")
}

fn is_slide(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.starts_with(SLIDE_PREFIX)
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(SLIDE_EXTENSION))
}

/// Number of a slide, `slide035_…` → 35.
fn slide_number(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix(SLIDE_PREFIX)?.split('_').next()?;
    digits.parse().ok()
}

/// Slides in `dir`, in display order (by slide number, then name).
pub fn list_slides(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut slides: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_slide(p))
        .collect();
    slides.sort_by_cached_key(|p| (slide_number(p).unwrap_or(usize::MAX), p.clone()));
    Ok(slides)
}

// ─── Conversion ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct PlannedSlide {
    station: StationId,
    capture: PathBuf,
    timestamp: String,
}

fn sorted_captures(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut captures: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_capture_file(p))
        .collect();
    captures.sort();
    Ok(captures)
}

/// Convert every capture in the working set at `dir` into a slide.
///
/// A station whose slide count already equals its capture count is skipped,
/// as is any slide that already exists. A capture that fails to decode is
/// logged and left out.
pub fn convert_all(dir: &Path, decoder: &dyn FrameDecoder) -> ConvertResult<ConversionSummary> {
    let io_err = |source| ConvertError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let existing = list_slides(dir).map_err(io_err)?;
    let mut plan = Vec::new();
    let mut done_stations = BTreeMap::new();

    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_dir() || !StationId::is_valid(name) {
            continue;
        }
        let station = StationId::from(name);
        let captures = sorted_captures(&path).map_err(io_err)?;

        let suffix = format!("_{station}.{SLIDE_EXTENSION}");
        let slides = existing
            .iter()
            .filter(|s| s.to_string_lossy().ends_with(&suffix))
            .count();
        let done = !captures.is_empty() && slides == captures.len();
        if done {
            debug!(%station, slides, "station already converted");
        }
        done_stations.insert(station.clone(), done);

        plan.extend(captures.into_iter().map(|capture| PlannedSlide {
            timestamp: capture_timestamp(&capture, &station),
            station: station.clone(),
            capture,
        }));
    }

    plan.sort_by(|a, b| (&a.timestamp, &a.station).cmp(&(&b.timestamp, &b.station)));

    let mut summary = ConversionSummary::default();
    for (number, slide) in plan.iter().enumerate() {
        let target = dir.join(slide_name(number, &slide.timestamp, &slide.station));
        if done_stations.get(&slide.station).copied().unwrap_or(false) || target.exists() {
            summary.skipped += 1;
            continue;
        }

        match convert_one(decoder, &slide.capture, &target) {
            Ok(()) => {
                debug!(capture = %slide.capture.display(), slide = %target.display(), "converted");
                summary.converted += 1;
            }
            Err(e) => {
                warn!(capture = %slide.capture.display(), error = %e, "could not convert capture");
                summary.failed += 1;
            }
        }
    }

    info!(
        dir = %dir.display(),
        converted = summary.converted,
        skipped = summary.skipped,
        failed = summary.failed,
        "conversion finished"
    );
    Ok(summary)
}

/// Decode one capture and write its slide through a temporary file.
fn convert_one(decoder: &dyn FrameDecoder, capture: &Path, target: &Path) -> ConvertResult<()> {
    let image = decoder.decode(capture)?.to_grayscale();
    let tmp = target.with_extension("png.tmp");
    image.save_with_format(&tmp, ImageFormat::Png)?;
    std::fs::rename(&tmp, target).map_err(|source| ConvertError::Io {
        path: target.to_path_buf(),
        source,
    })
}
