use std::time::Duration;
use tracing::{info, warn};

use crate::core::config::Pacing;
use crate::features::antibot::{full_scroll_bottom, human_like_scroll, last_resort_click};
use crate::scraping::driver::{Locator, PageDriver};
use crate::scraping::site::SiteProfile;

/// What the loader managed to materialize. The caller still checks yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub rounds_used: u32,
    pub final_count: usize,
    pub reached_target: bool,
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// Close the sign-in interstitial if it shows up.
///
/// No dialog within `popup_timeout` is the common case and needs nothing.
/// Any other failure ends in the last-resort click, except a closed target.
pub async fn dismiss_signin_popup(driver: &dyn PageDriver, site: &SiteProfile, pacing: &Pacing) -> bool {
    let result = match driver
        .wait_visible(&site.signin_dialog(), pacing.popup_timeout, pacing.poll_interval)
        .await
    {
        Ok(()) => driver.click(&site.signin_dialog_close()).await,
        Err(e) if e.is_timeout() => {
            info!("No sign-in popup to dismiss (timeout)");
            return false;
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!("Dismissed the sign-in popup");
            true
        }
        Err(e) if e.is_target_closed() => {
            warn!("Target closed while dismissing popup; skipping last-resort click");
            false
        }
        Err(e) => {
            warn!("Could not dismiss sign-in popup: {}", e);
            let _ = last_resort_click(driver, site.fallback_click).await;
            false
        }
    }
}

async fn wait_load_more(driver: &dyn PageDriver, load_more: &Locator, pacing: &Pacing) -> bool {
    driver
        .wait_visible(load_more, pacing.load_more_timeout, pacing.poll_interval)
        .await
        .is_ok()
}

async fn card_count(driver: &dyn PageDriver, cards: &Locator) -> usize {
    match driver.count(cards).await {
        Ok(n) => n,
        Err(e) => {
            warn!("Could not count hotel cards: {}", e);
            0
        }
    }
}

/// Scroll and press "load more" until `min_count` cards are on the page or
/// `max_rounds` rounds are spent. Every loop iteration consumes exactly one
/// round, whatever happened inside it.
pub async fn load_hotel_cards(
    driver: &dyn PageDriver,
    site: &SiteProfile,
    pacing: &Pacing,
    min_count: usize,
    max_rounds: u32,
) -> LoadOutcome {
    let cards = site.cards();
    let load_more = site.load_more();
    let mut rounds_used = 0;
    let mut reached_target = false;

    while rounds_used < max_rounds {
        rounds_used += 1;
        full_scroll_bottom(driver, pacing.bottom_scroll_attempts, pacing.bottom_scroll_pause).await;
        human_like_scroll(driver, pacing).await;

        if wait_load_more(driver, &load_more, pacing).await {
            info!("Load more results button is visible");
        } else {
            info!("Load more results button not visible; trying to dismiss popup");
            dismiss_signin_popup(driver, site, pacing).await;
            pause(pacing.popup_settle).await;
            full_scroll_bottom(driver, pacing.bottom_scroll_attempts, pacing.bottom_scroll_pause).await;
            if !wait_load_more(driver, &load_more, pacing).await {
                info!("Still no load more button; round {} consumed", rounds_used);
                continue;
            }
            info!("Load more results button is now visible");
        }

        let current = card_count(driver, &cards).await;
        info!("Current hotel card count: {}", current);
        if current >= min_count {
            info!("Desired number of hotel cards loaded");
            reached_target = true;
            break;
        }

        if let Err(e) = driver.click(&load_more).await {
            warn!("Error clicking load more: {}", e);
            let _ = last_resort_click(driver, site.fallback_click).await;
            continue;
        }
        info!("Clicked load more ({} round(s) used)", rounds_used);

        match driver
            .wait_count_above(&cards, current, pacing.new_cards_timeout, pacing.poll_interval)
            .await
        {
            Ok(n) => info!("New hotel cards loaded ({} -> {})", current, n),
            Err(e) => info!("No new hotel cards loaded: {}", e),
        }
    }

    full_scroll_bottom(driver, pacing.settle_scrolls, pacing.settle_pause).await;
    pause(pacing.settle_pause).await;
    let final_count = card_count(driver, &cards).await;
    info!("Final hotel card count: {}", final_count);

    LoadOutcome {
        rounds_used,
        final_count,
        reached_target: reached_target || final_count >= min_count,
    }
}
