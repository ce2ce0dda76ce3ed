//! Display cycle: the ordered slides of the working set, their captions and
//! the renderer that puts them on screen.

use chrono::{Datelike, NaiveDate, NaiveTime};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CamsyncError, CamsyncResult};

const DUTCH_MONTHS: [&str; 12] = [
    "januari",
    "februari",
    "maart",
    "april",
    "mei",
    "juni",
    "juli",
    "augustus",
    "september",
    "oktober",
    "november",
    "december",
];

// ─── Captions ─────────────────────────────────────────────────────────────────

/// Capture moment of a slide, read from its file name.
///
/// `slide035_20231014_021113_363_0776192_BE000D.png` → `14 oktober 2023 om 02:11`
pub fn slide_moment(file_name: &str) -> Option<String> {
    let mut fields = file_name.split('_').skip(1);
    let date = NaiveDate::parse_from_str(fields.next()?, "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(fields.next()?, "%H%M%S").ok()?;
    let month = DUTCH_MONTHS[date.month0() as usize];
    Some(format!(
        "{} {month} {} om {}",
        date.day(),
        date.year(),
        time.format("%H:%M")
    ))
}

/// `(i/n) <moment>`, falling back to the file name when it carries no moment.
pub fn caption(index: usize, total: usize, file_name: &str) -> String {
    let moment = slide_moment(file_name).unwrap_or_else(|| file_name.to_string());
    format!("({index}/{total}) {moment}")
}

// ─── Geometry ─────────────────────────────────────────────────────────────────

/// Largest size with the image's aspect ratio that fits inside `area`
/// without upscaling.
pub fn fit_within(image: (u32, u32), area: (u32, u32)) -> (u32, u32) {
    let (width, height) = image;
    let (max_width, max_height) = area;
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let aspect = f64::from(width) / f64::from(height);

    let mut new_width = max_width.min(width);
    let mut new_height = (f64::from(new_width) / aspect) as u32;
    if new_height > max_height {
        new_height = max_height.min(height);
        new_width = (f64::from(new_height) * aspect) as u32;
    }
    (new_width, new_height)
}

/// Top-left offset that centers `size` inside `area`.
pub fn centered(size: (u32, u32), area: (u32, u32)) -> (u32, u32) {
    (
        area.0.saturating_sub(size.0) / 2,
        area.1.saturating_sub(size.1) / 2,
    )
}

// ─── Slide Deck ───────────────────────────────────────────────────────────────

/// One slide as handed to a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    /// 1-based position in the deck.
    pub index: usize,
    pub total: usize,
    pub path: PathBuf,
    pub caption: String,
}

/// Slides of the working set in display order, cycled endlessly.
#[derive(Debug, Clone, Default)]
pub struct SlideDeck {
    slides: Vec<PathBuf>,
    cursor: usize,
}

impl SlideDeck {
    pub fn new(slides: Vec<PathBuf>) -> Self {
        Self { slides, cursor: 0 }
    }

    /// Read the slides of the working set at `dir`. A missing directory gives
    /// an empty deck.
    pub fn load(dir: &Path) -> CamsyncResult<Self> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "working set missing, empty deck");
            return Ok(Self::default());
        }
        let slides = cams_convert::list_slides(dir)?;
        info!(dir = %dir.display(), slides = slides.len(), "slide deck built");
        Ok(Self::new(slides))
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// The next slide, wrapping around at the end.
    pub fn advance(&mut self) -> Option<Slide> {
        if self.slides.is_empty() {
            return None;
        }
        let position = self.cursor % self.slides.len();
        self.cursor = position + 1;

        let path = self.slides[position].clone();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Slide {
            index: position + 1,
            total: self.slides.len(),
            caption: caption(position + 1, self.slides.len(), &name),
            path,
        })
    }
}

// ─── Renderers ────────────────────────────────────────────────────────────────

/// Puts slides on screen.
pub trait Renderer: Send {
    /// Drawing area in pixels.
    fn area(&self) -> (u32, u32);

    fn show(&mut self, slide: &Slide) -> CamsyncResult<()>;

    /// Nothing to show yet.
    fn show_empty(&mut self) {}
}

/// Renderer for headless kiosks and debugging: logs each slide with the size
/// it would be drawn at.
#[derive(Debug, Clone)]
pub struct LogRenderer {
    area: (u32, u32),
    shown: usize,
}

impl LogRenderer {
    pub fn new(area: (u32, u32), full_screen: bool, display: usize) -> Self {
        // `info!` brings `tracing::field::display` into scope, shadowing the argument.
        let display_index = display;
        info!(
            width = area.0,
            height = area.1,
            full_screen,
            display = display_index,
            "slideshow window"
        );
        Self { area, shown: 0 }
    }

    pub fn shown(&self) -> usize {
        self.shown
    }
}

impl Renderer for LogRenderer {
    fn area(&self) -> (u32, u32) {
        self.area
    }

    fn show(&mut self, slide: &Slide) -> CamsyncResult<()> {
        let dimensions = image::image_dimensions(&slide.path)
            .map_err(|e| CamsyncError::Display(format!("{}: {e}", slide.path.display())))?;
        let size = fit_within(dimensions, self.area);
        let offset = centered(size, self.area);
        self.shown += 1;
        info!(
            caption = %slide.caption,
            slide = %slide.path.display(),
            width = size.0,
            height = size.1,
            x = offset.0,
            y = offset.1,
            "showing slide"
        );
        Ok(())
    }

    fn show_empty(&mut self) {
        debug!("no slides to show");
    }
}
