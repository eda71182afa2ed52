//! Scripted page driver: card counts, popup, load-more and calendar
//! behaviour all come from a `PageScript`.
#![allow(dead_code)]

use async_trait::async_trait;
use hotel_sweep::core::config::{Pacing, RunConfig};
use hotel_sweep::driver::{
    BrowsingSession, CardQuery, Locator, PageDriver, ResultCard, SessionFactory,
};
use hotel_sweep::scraping::site::{CardFields, SiteProfile};
use hotel_sweep::{SweepError, SweepResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Production defaults with every pause zeroed.
pub fn fast_config(max_task_attempts: Option<u32>, stable_yield_limit: u32) -> RunConfig {
    RunConfig {
        min_cards_per_task: 100,
        max_load_rounds: 5,
        max_task_attempts,
        stable_yield_limit,
        site: SiteProfile::default(),
        pacing: Pacing::immediate(),
        ..RunConfig::default()
    }
}

pub struct FakeCard {
    index: usize,
    fields: CardFields,
}

#[async_trait]
impl ResultCard for FakeCard {
    async fn text(&self, query: &CardQuery) -> SweepResult<String> {
        match query {
            CardQuery::Css { selector } if *selector == self.fields.title => {
                Ok(format!("Hotel {}", self.index))
            }
            CardQuery::Css { selector } if *selector == self.fields.review_count => {
                Ok("1,234 reviews".to_string())
            }
            CardQuery::Css { selector } if *selector == self.fields.price => {
                Ok(" $250 ".to_string())
            }
            other => Err(SweepError::ElementNotFound(format!("{:?}", other))),
        }
    }

    async fn attribute(&self, query: &CardQuery, name: &str) -> SweepResult<Option<String>> {
        match query {
            CardQuery::Css { selector } if *selector == self.fields.star_rating && name == "aria-label" => {
                Ok(Some("4 out of 5 stars".to_string()))
            }
            CardQuery::Css { selector } if *selector == self.fields.location_score => {
                Ok(Some("Scored 8.3".to_string()))
            }
            other => Err(SweepError::ElementNotFound(format!("{:?}", other))),
        }
    }

    async fn is_visible(&self, query: &CardQuery) -> SweepResult<bool> {
        Ok(*query == self.fields.free_cancellation())
    }

    async fn full_text(&self) -> SweepResult<String> {
        Ok("Hotel near SUBWAY ACCESS".to_string())
    }
}

/// How the sign-in interstitial behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    Absent,
    /// Shown until its close button is clicked.
    Closes,
    /// Shown, but the close click fails.
    CloseFails,
    /// Shown, and the close click reports a closed target.
    TargetClosed,
}

/// Page behaviour a session follows. `Default` is a cooperative page.
#[derive(Debug, Clone, Copy)]
pub struct PageScript {
    /// Load-more visibility checks answered "hidden" before it shows.
    pub load_more_hidden_checks: u32,
    pub popup: Popup,
    pub load_more_click_fails: bool,
    /// Cards added by each successful load-more click.
    pub growth_per_click: usize,
    /// Calendar days never become visible.
    pub calendar_hidden: bool,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            load_more_hidden_checks: 0,
            popup: Popup::Absent,
            load_more_click_fails: false,
            growth_per_click: 0,
            calendar_hidden: false,
        }
    }
}

/// Counters shared between a factory, its sessions and the test after the
/// factory moves into an executor.
#[derive(Clone, Default)]
pub struct Tally {
    opened: Arc<AtomicU32>,
    closed: Arc<AtomicU32>,
    mouse_clicks: Arc<AtomicU32>,
    clicks: Arc<Mutex<Vec<String>>>,
}

impl Tally {
    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn mouse_clicks(&self) -> u32 {
        self.mouse_clicks.load(Ordering::SeqCst)
    }

    /// Every locator clicked, as `Locator::describe` renders it.
    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn clicks_on(&self, what: &str) -> usize {
        self.clicks.lock().unwrap().iter().filter(|c| *c == what).count()
    }
}

/// One scripted session. `cards` is what the results page currently shows.
pub struct FakeSession {
    cards: AtomicUsize,
    site: SiteProfile,
    script: PageScript,
    load_more_checks: AtomicU32,
    popup_dismissed: AtomicBool,
    tally: Tally,
}

impl FakeSession {
    pub fn new(cards: usize, site: SiteProfile) -> Self {
        Self::scripted(cards, site, PageScript::default())
    }

    pub fn scripted(cards: usize, site: SiteProfile, script: PageScript) -> Self {
        Self::with_tally(cards, site, script, Tally::default())
    }

    fn with_tally(cards: usize, site: SiteProfile, script: PageScript, tally: Tally) -> Self {
        Self {
            cards: AtomicUsize::new(cards),
            site,
            script,
            load_more_checks: AtomicU32::new(0),
            popup_dismissed: AtomicBool::new(false),
            tally,
        }
    }

    pub fn tally(&self) -> Tally {
        self.tally.clone()
    }

    fn popup_showing(&self) -> bool {
        self.script.popup != Popup::Absent && !self.popup_dismissed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageDriver for FakeSession {
    async fn goto(&self, _url: &str) -> SweepResult<()> {
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> SweepResult<()> {
        self.tally.clicks.lock().unwrap().push(locator.describe());

        if *locator == self.site.signin_dialog_close() {
            return match self.script.popup {
                Popup::Absent => Err(SweepError::ElementNotFound(locator.describe())),
                Popup::Closes => {
                    self.popup_dismissed.store(true, Ordering::SeqCst);
                    Ok(())
                }
                Popup::CloseFails => Err(SweepError::Automation("element is not clickable".into())),
                Popup::TargetClosed => Err(SweepError::TargetClosed("page closed".into())),
            };
        }
        if *locator == self.site.load_more() {
            if self.script.load_more_click_fails {
                return Err(SweepError::Automation("element click intercepted".into()));
            }
            self.cards.fetch_add(self.script.growth_per_click, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn fill(&self, _locator: &Locator, _text: &str) -> SweepResult<()> {
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> SweepResult<bool> {
        if matches!(locator, Locator::Dialog { .. }) {
            return Ok(self.popup_showing());
        }
        if *locator == self.site.load_more() {
            let seen = self.load_more_checks.fetch_add(1, Ordering::SeqCst);
            return Ok(seen >= self.script.load_more_hidden_checks);
        }
        if let Locator::Role { role, .. } = locator {
            if role == "checkbox" {
                return Ok(!self.script.calendar_hidden);
            }
        }
        Ok(true)
    }

    async fn count(&self, locator: &Locator) -> SweepResult<usize> {
        if *locator == self.site.cards() {
            Ok(self.cards.load(Ordering::SeqCst))
        } else {
            Ok(1)
        }
    }

    async fn evaluate(&self, _script: &str) -> SweepResult<serde_json::Value> {
        Ok(serde_json::Value::Bool(true))
    }

    async fn mouse_click(&self, _x: f64, _y: f64) -> SweepResult<()> {
        self.tally.mouse_clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cards(&self, _locator: &Locator, limit: usize) -> SweepResult<Vec<Box<dyn ResultCard>>> {
        let total = self.cards.load(Ordering::SeqCst);
        Ok((0..total.min(limit))
            .map(|index| {
                Box::new(FakeCard {
                    index,
                    fields: self.site.fields.clone(),
                }) as Box<dyn ResultCard>
            })
            .collect())
    }
}

#[async_trait]
impl BrowsingSession for FakeSession {
    async fn close(self) {
        self.tally.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out sessions following a script of card counts; `None` fails the
/// launch. Once the script runs out every session shows `fallback` cards.
pub struct FakeFactory {
    yields: Mutex<VecDeque<Option<usize>>>,
    fallback: usize,
    site: SiteProfile,
    page: PageScript,
    tally: Tally,
}

impl FakeFactory {
    pub fn new(yields: impl IntoIterator<Item = Option<usize>>, fallback: usize) -> Self {
        Self {
            yields: Mutex::new(yields.into_iter().collect()),
            fallback,
            site: SiteProfile::default(),
            page: PageScript::default(),
            tally: Tally::default(),
        }
    }

    pub fn yields(script: impl IntoIterator<Item = usize>) -> Self {
        Self::new(script.into_iter().map(Some), 0)
    }

    pub fn always(cards: usize) -> Self {
        Self::new([], cards)
    }

    /// Every session follows `page`.
    pub fn with_page(mut self, page: PageScript) -> Self {
        self.page = page;
        self
    }

    pub fn tally(&self) -> Tally {
        self.tally.clone()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn open(&self) -> SweepResult<FakeSession> {
        let next = self
            .yields
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Some(self.fallback));
        let Some(cards) = next else {
            return Err(SweepError::BrowserLaunch("scripted launch failure".into()));
        };
        self.tally.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession::with_tally(
            cards,
            self.site.clone(),
            self.page,
            self.tally.clone(),
        ))
    }
}
