//! Human-like pacing: jittered delays, stepped scrolling and the last-resort
//! coordinate click.
//!
//! None of this is required for correctness. It keeps the interaction rhythm
//! close enough to a person that the results page keeps serving cards.

use crate::core::config::Pacing;
use crate::core::error::SweepResult;
use crate::scraping::driver::PageDriver;
use rand::distr::{Distribution, Uniform};
use std::time::Duration;
use tracing::{info, warn};

/// Inclusive-exclusive jitter window in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl PacingDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Delay used between stepped scroll increments.
    pub fn human_scroll() -> Self {
        Self::new(100, 500)
    }

    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Draw one delay. Degenerate windows (`max <= min`) yield `min`.
    pub fn sample(&self) -> Duration {
        let mut rng = rand::rng();
        let ms = Uniform::new(self.min_ms, self.max_ms)
            .map(|dist| dist.sample(&mut rng))
            .unwrap_or(self.min_ms);
        Duration::from_millis(ms)
    }
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// Jump to the bottom of the document `attempts` times to trip lazy loading.
pub async fn full_scroll_bottom(driver: &dyn PageDriver, attempts: u32, between: Duration) {
    for _ in 0..attempts {
        if let Err(e) = driver.scroll_to_bottom().await {
            warn!("Full scroll to bottom failed: {}", e);
        }
        pause(between).await;
    }
}

/// Scroll down in small increments with a jittered delay after each step.
pub async fn human_like_scroll(driver: &dyn PageDriver, pacing: &Pacing) -> u32 {
    let step = pacing.human_scroll_step_px.max(1);
    let mut scrolled = 0u32;
    while scrolled < pacing.human_scroll_total_px {
        if let Err(e) = driver.scroll_by(step as i64).await {
            warn!("Stepped scroll failed after {}px: {}", scrolled, e);
            break;
        }
        scrolled += step;
        let delay = pacing.human_scroll_delay.sample();
        pause(delay).await;
    }
    info!("Human-like scrolled a total of {} pixels", scrolled);
    scrolled
}

/// Last-resort recovery: click a neutral spot of the viewport.
///
/// Only called after the primary action and any documented secondary action
/// failed. It dismisses most stray overlays without touching page content.
pub async fn last_resort_click(driver: &dyn PageDriver, at: (f64, f64)) -> SweepResult<()> {
    match driver.mouse_click(at.0, at.1).await {
        Ok(()) => {
            info!("Last-resort click executed at ({}, {})", at.0, at.1);
            Ok(())
        }
        Err(e) => {
            warn!("Last-resort click at ({}, {}) failed: {}", at.0, at.1, e);
            Err(e)
        }
    }
}
