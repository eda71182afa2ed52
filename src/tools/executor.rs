//! Runs one DateTask end-to-end: search, load, extract, and retry in a
//! fresh browser until the yield is good enough or the task is abandoned.

use backoff::backoff::Constant;
use backoff::future::retry_notify;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::config::{Pacing, RunConfig};
use crate::core::error::SweepResult;
use crate::core::types::{AbandonReason, DateTask, HotelRecord, TaskOutcome};
use crate::features::antibot::last_resort_click;
use crate::scraping::driver::{BrowsingSession, PageDriver, SessionFactory};
use crate::scraping::site::SiteProfile;
use crate::tools::extract::{extract_records, CARD_EXTRACTION_CAP};
use crate::tools::load_more::load_hotel_cards;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    New,
    SessionOpen,
    Searching,
    DateSelecting,
    Loading,
    Extracting,
    Accepted,
    Retry,
    Abandoned,
}

fn log_state(task: &DateTask, attempt: u32, state: TaskState) {
    info!("task_state={:?} task={} attempt={}", state, task, attempt);
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// Click "next month" until the calendar shows `label`, up to
/// `calendar_max_steps` times. The caller clicks the date regardless.
pub async fn ensure_date_visible(driver: &dyn PageDriver, site: &SiteProfile, pacing: &Pacing, label: &str) {
    let day = site.calendar_day(label);
    let max_steps = pacing.calendar_max_steps;
    let mut steps = 0;

    while steps < max_steps && !driver.is_visible(&day).await.unwrap_or(false) {
        info!(
            "Date '{}' not visible; clicking next month ({}/{})",
            label,
            steps + 1,
            max_steps
        );
        match driver
            .click_when_visible(&site.next_month(), pacing.action_timeout, pacing.poll_interval)
            .await
        {
            Ok(()) => pause(pacing.calendar_step_pause).await,
            Err(e) => {
                warn!("Error clicking next month: {}", e);
                let _ = last_resort_click(driver, site.fallback_click).await;
            }
        }
        steps += 1;
    }

    if steps == max_steps && !driver.is_visible(&day).await.unwrap_or(false) {
        warn!("Date '{}' not visible after {} attempts", label, max_steps);
    }
}

/// Consecutive-yield bookkeeping across the attempts of one task.
#[derive(Debug, Default)]
struct YieldLedger {
    attempts: u32,
    best_yield: usize,
    last_yield: Option<usize>,
    streak: u32,
}

impl YieldLedger {
    fn observe(&mut self, yield_count: usize) {
        self.attempts += 1;
        self.best_yield = self.best_yield.max(yield_count);
        if self.last_yield == Some(yield_count) {
            self.streak += 1;
        } else {
            self.streak = 1;
        }
        self.last_yield = Some(yield_count);
    }
}

/// Result of one short attempt: either worth retrying or the end of the task.
#[derive(Debug)]
enum Shortfall {
    Retry { attempts: u32, yield_count: usize },
    Abandon(AbandonReason),
}

/// Per-task retry loop over fresh browsing sessions.
pub struct TaskExecutor<F: SessionFactory> {
    factory: F,
    config: RunConfig,
}

impl<F: SessionFactory> TaskExecutor<F> {
    pub fn new(factory: F, config: RunConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    async fn search(&self, driver: &dyn PageDriver, task: &DateTask, attempt: u32) -> SweepResult<()> {
        let site = &self.config.site;
        let pacing = &self.config.pacing;
        let (timeout, poll) = (pacing.action_timeout, pacing.poll_interval);

        log_state(task, attempt, TaskState::Searching);
        driver.goto(&site.base_url).await?;
        let destination = site.destination_input();
        driver.click_when_visible(&destination, timeout, poll).await?;
        driver.fill(&destination, &site.destination_query).await?;
        driver.click_when_visible(&site.suggestion(), timeout, poll).await?;

        log_state(task, attempt, TaskState::DateSelecting);
        for label in [task.checkin_label(), task.checkout_label()] {
            ensure_date_visible(driver, site, pacing, &label).await;
            driver.click(&site.calendar_day(&label)).await?;
        }

        driver.click_when_visible(&site.search(), timeout, poll).await?;
        pause(pacing.post_search_pause).await;
        Ok(())
    }

    async fn drive(&self, driver: &dyn PageDriver, task: &DateTask, attempt: u32) -> SweepResult<Vec<HotelRecord>> {
        let cfg = &self.config;
        self.search(driver, task, attempt).await?;

        log_state(task, attempt, TaskState::Loading);
        let loaded = load_hotel_cards(
            driver,
            &cfg.site,
            &cfg.pacing,
            cfg.min_cards_per_task,
            cfg.max_load_rounds,
        )
        .await;
        info!(
            "Loader finished for {}: {} cards after {} round(s)",
            task, loaded.final_count, loaded.rounds_used
        );

        log_state(task, attempt, TaskState::Extracting);
        let limit = cfg.min_cards_per_task.max(CARD_EXTRACTION_CAP);
        extract_records(driver, &cfg.site, task, limit).await
    }

    /// One attempt in its own session. Any failure is a zero yield; the
    /// session is closed on every path.
    pub async fn run_attempt(&self, task: &DateTask, attempt: u32) -> Vec<HotelRecord> {
        log_state(task, attempt, TaskState::New);
        let session = match self.factory.open().await {
            Ok(s) => s,
            Err(e) => {
                warn!("Could not open a browser session for {}: {}", task, e);
                return Vec::new();
            }
        };
        log_state(task, attempt, TaskState::SessionOpen);

        let result = self.drive(&session, task, attempt).await;
        session.close().await;

        match result {
            Ok(records) => records,
            Err(e) => {
                warn!("Attempt {} for {} failed: {}", attempt, task, e);
                Vec::new()
            }
        }
    }

    fn judge(&self, ledger: &YieldLedger, yield_count: usize) -> Shortfall {
        let cfg = &self.config;
        let attempts = ledger.attempts;
        if yield_count > 0
            && cfg.stable_yield_limit > 0
            && ledger.streak >= cfg.stable_yield_limit
        {
            return Shortfall::Abandon(AbandonReason::RecordsExhausted {
                attempts,
                yield_count,
            });
        }
        if let Some(max) = cfg.max_task_attempts {
            if attempts >= max {
                return Shortfall::Abandon(AbandonReason::MaxAttemptsReached {
                    attempts,
                    best_yield: ledger.best_yield,
                });
            }
        }
        Shortfall::Retry {
            attempts,
            yield_count,
        }
    }

    /// Attempt the task until it yields `min_cards_per_task` records.
    ///
    /// Short attempts are discarded whole. The loop ends with `Accepted`, or
    /// `Abandoned` once the attempt budget is spent or the same short yield
    /// repeats `stable_yield_limit` times in a row.
    pub async fn run(&self, task: &DateTask) -> TaskOutcome {
        let min_cards = self.config.min_cards_per_task;
        let ledger = Mutex::new(YieldLedger::default());

        let operation = || {
            let ledger = &ledger;
            async move {
                let attempt = ledger.lock().await.attempts + 1;
                info!("Scraping for date {} (attempt {})...", task, attempt);
                let records = self.run_attempt(task, attempt).await;

                let mut ledger = ledger.lock().await;
                ledger.observe(records.len());
                if records.len() >= min_cards {
                    log_state(task, attempt, TaskState::Accepted);
                    info!(
                        "Successfully scraped {} hotels for date {}",
                        records.len(),
                        task
                    );
                    return Ok((records, ledger.attempts));
                }
                match self.judge(&ledger, records.len()) {
                    Shortfall::Abandon(reason) => Err(backoff::Error::permanent(Shortfall::Abandon(reason))),
                    retry => Err(backoff::Error::transient(retry)),
                }
            }
        };

        let notify = |shortfall: Shortfall, wait: Duration| {
            if let Shortfall::Retry {
                attempts,
                yield_count,
            } = shortfall
            {
                log_state(task, attempts, TaskState::Retry);
                info!(
                    "Only scraped {} hotels for date {} after attempt {}; retrying in a new browser in {:?}",
                    yield_count, task, attempts, wait
                );
            }
        };

        let backoff = Constant::new(self.config.pacing.retry_pause);
        match retry_notify(backoff, operation, notify).await {
            Ok((records, attempts)) => TaskOutcome::Accepted { records, attempts },
            Err(Shortfall::Abandon(reason)) => {
                log_state(task, ledger.lock().await.attempts, TaskState::Abandoned);
                warn!("Abandoning {}: {}", task, reason);
                TaskOutcome::Abandoned(reason)
            }
            Err(Shortfall::Retry {
                attempts,
                yield_count,
            }) => {
                // Only reachable if the backoff ever stops; treat it as budget spent.
                let reason = AbandonReason::MaxAttemptsReached {
                    attempts,
                    best_yield: yield_count.max(ledger.lock().await.best_yield),
                };
                warn!("Abandoning {}: {}", task, reason);
                TaskOutcome::Abandoned(reason)
            }
        }
    }
}
