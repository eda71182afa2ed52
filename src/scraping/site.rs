//! Markup knowledge for the target site, kept as data.
//!
//! Defaults match the live booking.com results page. Everything can be
//! overridden from the `site` section of `hotel-sweep.json` when the layout
//! shifts, without touching the orchestration code.

use crate::scraping::driver::{CardQuery, Locator};
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SiteProfile {
    pub base_url: String,
    pub destination_query: String,
    pub destination_combobox: String,
    pub destination_suggestion: String,
    pub next_month_button: String,
    pub search_button: String,
    pub load_more_button: String,
    pub signin_dialog_text: String,
    pub dialog_close_button: String,
    pub card_selector: String,
    /// Viewport point used by the last-resort click.
    pub fallback_click: (f64, f64),
    pub fields: CardFields,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            base_url: "https://www.booking.com".to_string(),
            destination_query: "new york".to_string(),
            destination_combobox: "Where are you going?".to_string(),
            destination_suggestion: "New York New York, United".to_string(),
            next_month_button: "Next month".to_string(),
            search_button: "Search".to_string(),
            load_more_button: "Load more results".to_string(),
            signin_dialog_text: "Sign in, save money".to_string(),
            dialog_close_button: "Close".to_string(),
            card_selector: "div[data-testid='property-card']".to_string(),
            fallback_click: (10.0, 10.0),
            fields: CardFields::default(),
        }
    }
}

impl SiteProfile {
    pub fn destination_input(&self) -> Locator {
        Locator::role("combobox", &self.destination_combobox)
    }

    pub fn suggestion(&self) -> Locator {
        Locator::role("button", &self.destination_suggestion)
    }

    /// Calendar day cell, matched on its full accessible name.
    pub fn calendar_day(&self, label: &str) -> Locator {
        Locator::role("checkbox", label).exact()
    }

    pub fn next_month(&self) -> Locator {
        Locator::role("button", &self.next_month_button)
    }

    pub fn search(&self) -> Locator {
        Locator::role("button", &self.search_button)
    }

    pub fn load_more(&self) -> Locator {
        Locator::role("button", &self.load_more_button)
    }

    pub fn signin_dialog(&self) -> Locator {
        Locator::Dialog {
            has_text: self.signin_dialog_text.clone(),
        }
    }

    pub fn signin_dialog_close(&self) -> Locator {
        Locator::DialogButton {
            has_text: self.signin_dialog_text.clone(),
            button: self.dialog_close_button.clone(),
        }
    }

    pub fn cards(&self) -> Locator {
        Locator::css(&self.card_selector)
    }
}

/// Card-relative lookups for every extracted field.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CardFields {
    pub title: String,
    /// Element whose `aria-label` reads like "4 out of 5 stars".
    pub star_rating: String,
    pub review_score: String,
    /// Link whose `aria-label` reads like "Scored 8.3".
    pub location_score: String,
    pub review_count: String,
    pub bed_info: String,
    pub price: String,
    pub distance: String,
    pub breakfast_text: String,
    pub free_cancellation_text: String,
    pub no_prepayment_text: String,
    pub sustainability_text: String,
    /// Any of these in the card text marks the hotel as central.
    pub central_phrases: Vec<String>,
}

impl Default for CardFields {
    fn default() -> Self {
        Self {
            title: "[data-testid='title']".to_string(),
            star_rating: "div.b3f3c831be".to_string(),
            review_score: "[data-testid='review-score']".to_string(),
            location_score: "a[data-testid='secondary-review-score-link']".to_string(),
            review_count: "div.abf093bdfe.f45d8e4c32.d935416c47".to_string(),
            bed_info: "div[data-testid='availability-single'] ul.ba51609c35 li:nth-child(1) div.abf093bdfe"
                .to_string(),
            price: "[data-testid='price-and-discounted-price']".to_string(),
            distance: "span[data-testid='distance']".to_string(),
            breakfast_text: "Breakfast included".to_string(),
            free_cancellation_text: "Free cancellation".to_string(),
            no_prepayment_text: "No prepayment needed".to_string(),
            sustainability_text: "Sustainability certification".to_string(),
            central_phrases: vec!["centrally".to_string(), "subway access".to_string()],
        }
    }
}

impl CardFields {
    pub fn breakfast(&self) -> CardQuery {
        CardQuery::text(&self.breakfast_text)
    }

    pub fn free_cancellation(&self) -> CardQuery {
        CardQuery::tagged_text("strong", &self.free_cancellation_text)
    }

    pub fn no_prepayment(&self) -> CardQuery {
        CardQuery::tagged_text("strong", &self.no_prepayment_text)
    }

    pub fn sustainability(&self) -> CardQuery {
        CardQuery::text(&self.sustainability_text)
    }
}
