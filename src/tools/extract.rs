//! Record extraction: one `HotelRecord` per rendered result card.
//!
//! Every field is read through its own `Result<T, FieldError>` and settled to
//! a sentinel on failure, so a half-rendered card still produces a row.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::error::{SweepError, SweepResult};
use crate::core::types::{DateTask, HotelRecord};
use crate::scraping::driver::{CardQuery, PageDriver, ResultCard};
use crate::scraping::site::{CardFields, SiteProfile};

/// Cards read per page; a larger acceptance threshold raises it.
pub const CARD_EXTRACTION_CAP: usize = 100;

/// Sentinel for required display text (name, bed info, price).
pub const MISSING_TEXT: &str = "N/A";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldError {
    #[error("element missing")]
    Missing,

    #[error("attribute '{0}' missing")]
    MissingAttribute(String),

    #[error("unparseable value '{0}'")]
    Unparseable(String),

    #[error("driver error: {0}")]
    Driver(String),
}

impl From<SweepError> for FieldError {
    fn from(e: SweepError) -> Self {
        match e {
            SweepError::ElementNotFound(_) | SweepError::Timeout { .. } => FieldError::Missing,
            other => FieldError::Driver(other.to_string()),
        }
    }
}

pub type FieldResult<T> = Result<T, FieldError>;

fn decimal_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+").ok()).as_ref()
}

fn scored_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Scored\s+(\d+(?:\.\d+)?)").ok()).as_ref()
}

/// `"4 out of 5 stars"` → `4`.
pub fn parse_star_rating(label: &str) -> FieldResult<u8> {
    let token = label
        .split_whitespace()
        .next()
        .ok_or_else(|| FieldError::Unparseable(label.to_string()))?;
    token
        .parse()
        .map_err(|_| FieldError::Unparseable(label.to_string()))
}

/// First decimal number in the text: `"Scored 8.6\n8.6"` → `8.6`.
pub fn parse_review_score(text: &str) -> FieldResult<f64> {
    decimal_re()
        .and_then(|re| re.find(text))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| FieldError::Unparseable(text.to_string()))
}

/// Number after `Scored` in the location link label; surrounding text is ignored.
pub fn parse_location_score(label: &str) -> FieldResult<f64> {
    scored_re()
        .and_then(|re| re.captures(label))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| FieldError::Unparseable(label.to_string()))
}

/// Digits only: `"1,234 reviews"` → `1234`.
pub fn parse_review_count(text: &str) -> FieldResult<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .parse()
        .map_err(|_| FieldError::Unparseable(text.to_string()))
}

/// Resolve one field, logging the fallback when it degrades to its sentinel.
fn settle<T>(field: &str, value: FieldResult<T>, sentinel: T) -> T {
    match value {
        Ok(v) => v,
        Err(e) => {
            warn!("field {} fell back to sentinel: {}", field, e);
            sentinel
        }
    }
}

/// Case-insensitive substring matcher for the "centrally located" phrases.
pub struct CentralMatcher {
    ac: Option<AhoCorasick>,
    lowered: Vec<String>,
}

impl CentralMatcher {
    pub fn new(phrases: &[String]) -> Self {
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(phrases)
            .ok();
        Self {
            ac,
            lowered: phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        if self.lowered.is_empty() {
            return false;
        }
        match &self.ac {
            Some(ac) => ac.is_match(text),
            None => {
                let text = text.to_lowercase();
                self.lowered.iter().any(|p| text.contains(p.as_str()))
            }
        }
    }
}

async fn card_text(card: &dyn ResultCard, selector: &str) -> FieldResult<String> {
    let text = card.text(&CardQuery::css(selector)).await?;
    Ok(text.trim().to_string())
}

async fn card_label(card: &dyn ResultCard, selector: &str) -> FieldResult<String> {
    card.attribute(&CardQuery::css(selector), "aria-label")
        .await?
        .ok_or_else(|| FieldError::MissingAttribute("aria-label".to_string()))
}

async fn card_flag(card: &dyn ResultCard, query: &CardQuery) -> FieldResult<bool> {
    Ok(card.is_visible(query).await?)
}

/// Map one card to a record. Never fails; every field has its own fallback.
pub async fn extract_card(
    card: &dyn ResultCard,
    fields: &CardFields,
    central: &CentralMatcher,
    task: &DateTask,
) -> HotelRecord {
    let hotel_name = settle(
        "hotel_name",
        card_text(card, &fields.title).await,
        MISSING_TEXT.to_string(),
    );
    let star_rating = settle(
        "star_rating",
        card_label(card, &fields.star_rating)
            .await
            .and_then(|l| parse_star_rating(&l))
            .map(Some),
        None,
    );
    let rating_score = settle(
        "rating_score",
        card_text(card, &fields.review_score)
            .await
            .and_then(|t| parse_review_score(&t))
            .map(Some),
        None,
    );
    let location_score = settle(
        "location_score",
        card_label(card, &fields.location_score)
            .await
            .and_then(|l| parse_location_score(&l))
            .map(Some),
        None,
    );
    let review_amount = settle(
        "review_amount",
        card_text(card, &fields.review_count)
            .await
            .and_then(|t| parse_review_count(&t))
            .map(Some),
        None,
    );
    let bed_info = settle(
        "bed_info",
        card_text(card, &fields.bed_info).await,
        MISSING_TEXT.to_string(),
    );
    let price = settle(
        "price",
        card_text(card, &fields.price).await,
        MISSING_TEXT.to_string(),
    );
    let breakfast_included = settle(
        "breakfast_included",
        card_flag(card, &fields.breakfast()).await,
        false,
    );
    let free_cancellation = settle(
        "free_cancellation",
        card_flag(card, &fields.free_cancellation()).await,
        false,
    );
    let no_prepayment_needed = settle(
        "no_prepayment_needed",
        card_flag(card, &fields.no_prepayment()).await,
        false,
    );
    let centrally_located = settle(
        "centrally_located",
        card.full_text()
            .await
            .map(|t| central.is_match(&t))
            .map_err(FieldError::from),
        false,
    );
    let sustainability_certification = settle(
        "sustainability_certification",
        card_flag(card, &fields.sustainability()).await,
        false,
    );
    let distance_from_downtown = settle(
        "distance_from_downtown",
        card_text(card, &fields.distance).await,
        String::new(),
    );

    HotelRecord {
        hotel_name,
        star_rating,
        rating_score,
        location_score,
        review_amount,
        bed_info,
        price,
        breakfast_included,
        free_cancellation,
        no_prepayment_needed,
        centrally_located,
        sustainability_certification,
        distance_from_downtown,
        checkin: task.checkin_label(),
        checkout: task.checkout_label(),
    }
}

/// Extract records from the first `min(total, limit)` cards, in card order.
///
/// Only the card listing itself can fail; individual fields never do.
pub async fn extract_records(
    driver: &dyn PageDriver,
    site: &SiteProfile,
    task: &DateTask,
    limit: usize,
) -> SweepResult<Vec<HotelRecord>> {
    let cards_locator = site.cards();
    let total = driver.count(&cards_locator).await?;
    info!("Total hotels found: {} (extracting up to {})", total, limit);

    let cards = driver.cards(&cards_locator, total.min(limit)).await?;
    let central = CentralMatcher::new(&site.fields.central_phrases);

    let mut records = Vec::with_capacity(cards.len());
    for card in &cards {
        records.push(extract_card(card.as_ref(), &site.fields, &central, task).await);
    }
    Ok(records)
}
