//! Chromium implementation of the page-driver capability.
//!
//! Element lookups run as small in-page scripts: the locator is serialized to
//! JSON, spliced into `LOCATE_JS`, and the script answers with counts,
//! visibility or click coordinates. Clicks are then dispatched as real mouse
//! events at those coordinates.

use crate::core::config::Pacing;
use crate::core::error::{SweepError, SweepResult};
use crate::scraping::browser_manager;
use crate::scraping::driver::{
    BrowsingSession, CardQuery, Locator, PageDriver, ResultCard, SessionFactory,
};
use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, Page};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

fn cdp_err(e: CdpError) -> SweepError {
    let msg = e.to_string();
    if msg.contains("Target closed") || msg.contains("ChannelSendError") {
        SweepError::TargetClosed(msg)
    } else {
        SweepError::Automation(msg)
    }
}

// Shared helpers prepended to every in-page script.
const DOM_HELPERS: &str = r#"
    const norm = (t) => (t || '').replace(/\s+/g, ' ').trim();
    const isVisible = (el) => {
        if (!el || !el.isConnected) return false;
        const style = window.getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden') return false;
        if (parseFloat(style.opacity) === 0) return false;
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    };
    const accName = (el) => {
        const label = el.labels && el.labels.length ? el.labels[0].innerText : '';
        return norm(el.getAttribute('aria-label') || label || el.getAttribute('title')
            || el.innerText || el.value || el.getAttribute('placeholder'));
    };
    const ROLE_SELECTORS = {
        button: 'button,[role="button"],input[type="button"],input[type="submit"]',
        checkbox: '[role="checkbox"],input[type="checkbox"]',
        combobox: '[role="combobox"],input[list],select',
        dialog: '[role="dialog"],dialog',
        link: 'a[href],[role="link"]',
    };
    const byRole = (root, role, name, exact) => {
        const sel = ROLE_SELECTORS[role] || `[role="${role}"]`;
        return Array.from(root.querySelectorAll(sel)).filter((el) => {
            if (!name) return true;
            const n = accName(el);
            return exact ? n === name : n.toLowerCase().includes(name.toLowerCase());
        });
    };
    const dialogsWith = (text) =>
        byRole(document, 'dialog', '', false).filter((d) => norm(d.innerText).includes(text));
    const locate = (target) => {
        switch (target.kind) {
            case 'role': return byRole(document, target.role, target.name, target.exact);
            case 'css': return Array.from(document.querySelectorAll(target.selector));
            case 'dialog': return dialogsWith(target.has_text);
            case 'dialog_button':
                return dialogsWith(target.has_text).flatMap((d) => byRole(d, 'button', target.button, false));
            default: return [];
        }
    };
"#;

const LOCATE_JS: &str = r#"
(() => {
    __HELPERS__
    const wanted = __LOCATOR__;
    const action = __ACTION__;
    const matches = locate(wanted);
    const target = matches.find(isVisible) || matches[0] || null;
    switch (action.op) {
        case 'count':
            return { found: matches.length > 0, count: matches.length };
        case 'visible':
            return { found: !!target, visible: !!target && isVisible(target) };
        case 'point': {
            if (!target) return { found: false };
            target.scrollIntoView({ block: 'center', inline: 'center' });
            const r = target.getBoundingClientRect();
            return { found: true, visible: isVisible(target), x: r.left + r.width / 2, y: r.top + r.height / 2 };
        }
        case 'fill': {
            if (!target) return { found: false };
            target.focus();
            const proto = target instanceof HTMLTextAreaElement
                ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
            const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
            setter.call(target, action.text);
            target.dispatchEvent(new Event('input', { bubbles: true }));
            target.dispatchEvent(new Event('change', { bubbles: true }));
            return { found: true };
        }
        default:
            return { found: false };
    }
})()
"#;

const CARD_JS: &str = r#"
(() => {
    __HELPERS__
    const card = document.querySelectorAll(__CARD_SELECTOR__)[__INDEX__];
    if (!card) return { card: false, found: false };
    const query = __QUERY__;
    const action = __ACTION__;
    let matches = [];
    if (query) {
        if (query.kind === 'css') {
            matches = Array.from(card.querySelectorAll(query.selector));
        } else {
            const needle = query.needle.toLowerCase();
            matches = Array.from(card.querySelectorAll(query.tag || '*'))
                .filter((el) => norm(el.innerText).toLowerCase().includes(needle));
        }
    }
    switch (action.op) {
        case 'text':
            return matches.length ? { card: true, found: true, value: matches[0].innerText } : { card: true, found: false };
        case 'attr':
            return matches.length ? { card: true, found: true, value: matches[0].getAttribute(action.name) } : { card: true, found: false };
        case 'visible':
            return { card: true, found: matches.length > 0, value: matches.some(isVisible) };
        case 'full_text':
            return { card: true, found: true, value: card.innerText };
        default:
            return { card: true, found: false };
    }
})()
"#;

#[derive(Debug, Default, Deserialize)]
struct LocateReply {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    visible: bool,
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CardReply {
    #[serde(default)]
    card: bool,
    #[serde(default)]
    found: bool,
    #[serde(default)]
    value: Value,
}

fn js_literal<T: serde::Serialize + ?Sized>(v: &T) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "null".to_string())
}

async fn evaluate_value(page: &Page, script: String) -> SweepResult<Value> {
    let result = page.evaluate(script).await.map_err(cdp_err)?;
    Ok(result.into_value::<Value>().unwrap_or(Value::Null))
}

/// One browser process + one page, for exactly one task attempt.
pub struct CdpSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    /// Private `--user-data-dir`; dropped only after the browser has exited.
    profile: Option<TempDir>,
    page: Page,
    field_timeout: Duration,
    poll_interval: Duration,
}

impl CdpSession {
    async fn locate(&self, locator: &Locator, action: Value) -> SweepResult<LocateReply> {
        let script = LOCATE_JS
            .replace("__HELPERS__", DOM_HELPERS)
            .replace("__LOCATOR__", &js_literal(locator))
            .replace("__ACTION__", &action.to_string());
        let value = evaluate_value(&self.page, script).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}

#[async_trait]
impl PageDriver for CdpSession {
    async fn goto(&self, url: &str) -> SweepResult<()> {
        info!("🌐 Navigating to: {}", url);
        self.page.goto(url).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> SweepResult<()> {
        let reply = self.locate(locator, json!({ "op": "point" })).await?;
        if !reply.found {
            return Err(SweepError::ElementNotFound(locator.describe()));
        }
        if !reply.visible {
            return Err(SweepError::Automation(format!(
                "{} is not visible",
                locator.describe()
            )));
        }
        match (reply.x, reply.y) {
            (Some(x), Some(y)) => self.mouse_click(x, y).await,
            _ => Err(SweepError::Automation(format!(
                "no click point for {}",
                locator.describe()
            ))),
        }
    }

    async fn fill(&self, locator: &Locator, text: &str) -> SweepResult<()> {
        let reply = self
            .locate(locator, json!({ "op": "fill", "text": text }))
            .await?;
        if reply.found {
            Ok(())
        } else {
            Err(SweepError::ElementNotFound(locator.describe()))
        }
    }

    async fn is_visible(&self, locator: &Locator) -> SweepResult<bool> {
        let reply = self.locate(locator, json!({ "op": "visible" })).await?;
        Ok(reply.visible)
    }

    async fn count(&self, locator: &Locator) -> SweepResult<usize> {
        let reply = self.locate(locator, json!({ "op": "count" })).await?;
        Ok(reply.count)
    }

    async fn evaluate(&self, script: &str) -> SweepResult<Value> {
        evaluate_value(&self.page, script.to_string()).await
    }

    async fn mouse_click(&self, x: f64, y: f64) -> SweepResult<()> {
        self.page.click(Point { x, y }).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn cards(&self, locator: &Locator, limit: usize) -> SweepResult<Vec<Box<dyn ResultCard>>> {
        let Locator::Css { selector } = locator else {
            return Err(SweepError::Automation(format!(
                "cards must be located by CSS, got {}",
                locator.describe()
            )));
        };
        let total = self.count(locator).await?;
        Ok((0..total.min(limit))
            .map(|index| {
                Box::new(CdpCard {
                    page: self.page.clone(),
                    card_selector: selector.clone(),
                    index,
                    timeout: self.field_timeout,
                    poll: self.poll_interval,
                }) as Box<dyn ResultCard>
            })
            .collect())
    }
}

#[async_trait]
impl BrowsingSession for CdpSession {
    async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
        if let Some(profile) = self.profile.take() {
            if let Err(e) = profile.close() {
                warn!("Profile dir cleanup failed: {}", e);
            }
        }
        debug!("Browser session closed");
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        // Drop cannot await; hand the close to the runtime so no Chromium
        // process outlives its attempt.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let handler = self.handler.take();
        let profile = self.profile.take();
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            return;
        };
        rt.spawn(async move {
            let _ = browser.close().await;
            let _ = browser.wait().await;
            if let Some(h) = handler {
                h.abort();
            }
            drop(profile);
        });
    }
}

/// Card handle addressed by index into the live card list.
struct CdpCard {
    page: Page,
    card_selector: String,
    index: usize,
    timeout: Duration,
    poll: Duration,
}

impl CdpCard {
    async fn query(&self, query: Option<&CardQuery>, action: Value) -> SweepResult<CardReply> {
        let script = CARD_JS
            .replace("__HELPERS__", DOM_HELPERS)
            .replace("__CARD_SELECTOR__", &js_literal(&self.card_selector))
            .replace("__INDEX__", &self.index.to_string())
            .replace("__QUERY__", &js_literal(&query))
            .replace("__ACTION__", &action.to_string());
        let value = evaluate_value(&self.page, script).await?;
        let reply: CardReply = serde_json::from_value(value).unwrap_or_default();
        if !reply.card {
            return Err(SweepError::ElementNotFound(format!(
                "card #{} ({})",
                self.index, self.card_selector
            )));
        }
        Ok(reply)
    }

    /// Re-query until the element shows up or the field timeout passes.
    async fn query_until_found(&self, query: &CardQuery, action: Value) -> SweepResult<CardReply> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let reply = self.query(Some(query), action.clone()).await?;
            if reply.found {
                return Ok(reply);
            }
            if Instant::now() >= deadline {
                return Err(SweepError::ElementNotFound(format!("{:?}", query)));
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}

#[async_trait]
impl ResultCard for CdpCard {
    async fn text(&self, query: &CardQuery) -> SweepResult<String> {
        let reply = self
            .query_until_found(query, json!({ "op": "text" }))
            .await?;
        reply
            .value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SweepError::ElementNotFound(format!("{:?} has no text", query)))
    }

    async fn attribute(&self, query: &CardQuery, name: &str) -> SweepResult<Option<String>> {
        let reply = self
            .query_until_found(query, json!({ "op": "attr", "name": name }))
            .await?;
        Ok(reply.value.as_str().map(str::to_string))
    }

    async fn is_visible(&self, query: &CardQuery) -> SweepResult<bool> {
        let reply = self.query(Some(query), json!({ "op": "visible" })).await?;
        Ok(reply.value.as_bool().unwrap_or(false))
    }

    async fn full_text(&self) -> SweepResult<String> {
        let reply = self.query(None, json!({ "op": "full_text" })).await?;
        Ok(reply.value.as_str().unwrap_or_default().to_string())
    }
}

/// Launches a brand-new browser for every session.
#[derive(Debug, Clone)]
pub struct CdpSessionFactory {
    exe: String,
    headless: bool,
    pacing: Pacing,
}

impl CdpSessionFactory {
    pub fn new(exe: impl Into<String>, headless: bool, pacing: Pacing) -> Self {
        Self {
            exe: exe.into(),
            headless,
            pacing,
        }
    }

    /// Factory over the auto-discovered executable, `None` when no browser is installed.
    pub fn discover(explicit: Option<&str>, headless: bool, pacing: Pacing) -> Option<Self> {
        browser_manager::find_chrome_executable(explicit).map(|exe| Self::new(exe, headless, pacing))
    }
}

#[async_trait]
impl SessionFactory for CdpSessionFactory {
    type Session = CdpSession;

    async fn open(&self) -> SweepResult<CdpSession> {
        let browser_manager::LaunchedBrowser {
            mut browser,
            handler,
            profile,
        } = browser_manager::launch_browser(&self.exe, self.headless)
            .await
            .map_err(|e| SweepError::BrowserLaunch(e.to_string()))?;

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                drop(profile);
                return Err(SweepError::BrowserLaunch(format!("failed to open tab: {}", e)));
            }
        };

        Ok(CdpSession {
            browser: Some(browser),
            handler: Some(handler),
            profile: Some(profile),
            page,
            field_timeout: self.pacing.field_timeout,
            poll_interval: self.pacing.poll_interval,
        })
    }
}
