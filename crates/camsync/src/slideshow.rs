//! The kiosk loop: every tick runs the daily check inline, rebuilds the deck
//! when the working set changed and shows the next slide.

use cams_schedule::{CheckReport, Scheduler};
use chrono::{Local, NaiveDateTime};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::display::{Renderer, SlideDeck};
use crate::error::CamsyncResult;

pub struct Slideshow {
    scheduler: Scheduler,
    renderer: Box<dyn Renderer>,
    deck: SlideDeck,
}

impl Slideshow {
    pub fn new(scheduler: Scheduler, renderer: Box<dyn Renderer>) -> Self {
        Self {
            scheduler,
            renderer,
            deck: SlideDeck::default(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn deck(&self) -> &SlideDeck {
        &self.deck
    }

    /// Convert anything left unconverted (e.g. after a crash between promotion
    /// and conversion) and build the first deck.
    pub async fn prepare(&mut self) -> CamsyncResult<()> {
        match self.scheduler.convert_working_set().await {
            Ok(summary) if summary.converted > 0 => {
                info!(converted = summary.converted, "converted pending captures");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not convert working set"),
        }
        self.rebuild()
    }

    fn rebuild(&mut self) -> CamsyncResult<()> {
        self.deck = SlideDeck::load(&self.scheduler.image_dir())?;
        Ok(())
    }

    /// One tick at the current local time.
    pub async fn tick(&mut self) -> CheckReport {
        self.tick_at(Local::now().naive_local()).await
    }

    pub async fn tick_at(&mut self, now: NaiveDateTime) -> CheckReport {
        let report = self.scheduler.check_at(now).await;
        if report.new_data_found() {
            info!(cycle = %report.cycle, "new night available");
        }

        if report.data_changed() || self.deck.is_empty() {
            if let Err(e) = self.rebuild() {
                error!(error = %e, "could not rebuild slide deck");
            }
        }

        match self.deck.advance() {
            Some(slide) => {
                if let Err(e) = self.renderer.show(&slide) {
                    warn!(error = %e, "could not show slide");
                }
            }
            None => self.renderer.show_empty(),
        }
        report
    }

    /// Tick every `interval` until `shutdown` resolves.
    pub async fn run<F>(&mut self, interval: Duration, shutdown: F) -> CamsyncResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("slideshow stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
