//! The page-driver capability the sweep depends on.
//!
//! Orchestration code (loader, extractor, executor) only talks to these
//! traits. `scraping::cdp` provides the Chromium implementation; tests drive
//! the same code with scripted fakes.

use crate::core::error::{SweepError, SweepResult};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Page-level element lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// ARIA role plus accessible name. Non-exact names match as a
    /// case-insensitive substring.
    Role {
        role: String,
        name: String,
        exact: bool,
    },
    Css { selector: String },
    /// A dialog whose text contains `has_text`.
    Dialog { has_text: String },
    /// A button inside a dialog whose text contains `has_text`.
    DialogButton { has_text: String, button: String },
}

impl Locator {
    pub fn role(role: &str, name: &str) -> Self {
        Locator::Role {
            role: role.to_string(),
            name: name.to_string(),
            exact: false,
        }
    }

    pub fn css(selector: &str) -> Self {
        Locator::Css {
            selector: selector.to_string(),
        }
    }

    /// Require the accessible name to match in full.
    pub fn exact(self) -> Self {
        match self {
            Locator::Role { role, name, .. } => Locator::Role {
                role,
                name,
                exact: true,
            },
            other => other,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Locator::Role { role, name, .. } => format!("{} '{}'", role, name),
            Locator::Css { selector } => selector.clone(),
            Locator::Dialog { has_text } => format!("dialog '{}'", has_text),
            Locator::DialogButton { has_text, button } => {
                format!("button '{}' in dialog '{}'", button, has_text)
            }
        }
    }
}

/// Lookup relative to one result card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardQuery {
    Css { selector: String },
    /// Any element (optionally of one tag) whose text contains `needle`,
    /// case-insensitively.
    Text { tag: Option<String>, needle: String },
}

impl CardQuery {
    pub fn css(selector: &str) -> Self {
        CardQuery::Css {
            selector: selector.to_string(),
        }
    }

    pub fn text(needle: &str) -> Self {
        CardQuery::Text {
            tag: None,
            needle: needle.to_string(),
        }
    }

    pub fn tagged_text(tag: &str, needle: &str) -> Self {
        CardQuery::Text {
            tag: Some(tag.to_string()),
            needle: needle.to_string(),
        }
    }
}

/// One rendered result card.
#[async_trait]
pub trait ResultCard: Send + Sync {
    /// Inner text of the first match. `ElementNotFound` if nothing matches.
    async fn text(&self, query: &CardQuery) -> SweepResult<String>;

    /// Attribute of the first match; `Ok(None)` when the element exists but
    /// carries no such attribute.
    async fn attribute(&self, query: &CardQuery, name: &str) -> SweepResult<Option<String>>;

    /// Whether any match is currently visible. Absence is `Ok(false)`.
    async fn is_visible(&self, query: &CardQuery) -> SweepResult<bool>;

    /// Whole-card inner text.
    async fn full_text(&self) -> SweepResult<String>;
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> SweepResult<()>;

    async fn click(&self, locator: &Locator) -> SweepResult<()>;

    async fn fill(&self, locator: &Locator, text: &str) -> SweepResult<()>;

    async fn is_visible(&self, locator: &Locator) -> SweepResult<bool>;

    async fn count(&self, locator: &Locator) -> SweepResult<usize>;

    async fn evaluate(&self, script: &str) -> SweepResult<serde_json::Value>;

    /// Raw mouse click at viewport coordinates.
    async fn mouse_click(&self, x: f64, y: f64) -> SweepResult<()>;

    /// Handles for the first `limit` matches of `locator`, in document order.
    async fn cards(&self, locator: &Locator, limit: usize) -> SweepResult<Vec<Box<dyn ResultCard>>>;

    async fn scroll_to_bottom(&self) -> SweepResult<()> {
        self.evaluate(
            "(() => { if (document.body) { window.scrollTo(0, document.body.scrollHeight); } return true; })()",
        )
        .await
        .map(|_| ())
    }

    async fn scroll_by(&self, dy: i64) -> SweepResult<()> {
        self.evaluate(&format!("(() => {{ window.scrollBy(0, {}); return true; }})()", dy))
            .await
            .map(|_| ())
    }

    /// Poll until `locator` is visible or `timeout` elapses.
    ///
    /// Always checks at least once, so a zero timeout is a single check.
    async fn wait_visible(&self, locator: &Locator, timeout: Duration, poll: Duration) -> SweepResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.is_visible(locator).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_target_closed() => return Err(e),
                Err(_) => {}
            }
            if Instant::now() >= deadline {
                return Err(SweepError::timeout(locator.describe(), timeout));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Wait for `locator` to become visible, then click it.
    async fn click_when_visible(&self, locator: &Locator, timeout: Duration, poll: Duration) -> SweepResult<()> {
        self.wait_visible(locator, timeout, poll).await?;
        self.click(locator).await
    }

    /// Poll until more than `baseline` elements match; returns the new count.
    async fn wait_count_above(
        &self,
        locator: &Locator,
        baseline: usize,
        timeout: Duration,
        poll: Duration,
    ) -> SweepResult<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            let n = self.count(locator).await?;
            if n > baseline {
                return Ok(n);
            }
            if Instant::now() >= deadline {
                return Err(SweepError::timeout(
                    format!("more than {} x {}", baseline, locator.describe()),
                    timeout,
                ));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// One isolated browser + page, scoped to a single task attempt.
#[async_trait]
pub trait BrowsingSession: PageDriver {
    /// Tear the browser down. Must be called on every exit path.
    async fn close(self)
    where
        Self: Sized;
}

/// Opens fresh sessions; one per attempt, nothing shared between them.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: BrowsingSession + 'static;

    async fn open(&self) -> SweepResult<Self::Session>;
}
