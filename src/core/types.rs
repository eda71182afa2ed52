use crate::core::error::{SweepError, SweepResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar label / record format, e.g. `1 January 2024`.
pub const DATE_LABEL_FORMAT: &str = "%-d %B %Y";

/// One (check-in, check-out) pair to scrape end-to-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateTask {
    checkin: NaiveDate,
    checkout: NaiveDate,
}

impl DateTask {
    pub fn new(checkin: NaiveDate, checkout: NaiveDate) -> SweepResult<Self> {
        if checkout <= checkin {
            return Err(SweepError::InvalidDateTask { checkin, checkout });
        }
        Ok(Self { checkin, checkout })
    }

    pub fn checkin(&self) -> NaiveDate {
        self.checkin
    }

    pub fn checkout(&self) -> NaiveDate {
        self.checkout
    }

    pub fn nights(&self) -> i64 {
        (self.checkout - self.checkin).num_days()
    }

    pub fn checkin_label(&self) -> String {
        self.checkin.format(DATE_LABEL_FORMAT).to_string()
    }

    pub fn checkout_label(&self) -> String {
        self.checkout.format(DATE_LABEL_FORMAT).to_string()
    }
}

impl fmt::Display for DateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.checkin, self.checkout)
    }
}

/// One listing card, flattened. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelRecord {
    pub hotel_name: String,
    pub star_rating: Option<u8>,
    pub rating_score: Option<f64>,
    pub location_score: Option<f64>,
    pub review_amount: Option<u64>,
    pub bed_info: String,
    pub price: String,
    pub breakfast_included: bool,
    pub free_cancellation: bool,
    pub no_prepayment_needed: bool,
    pub centrally_located: bool,
    pub sustainability_certification: bool,
    pub distance_from_downtown: String,
    pub checkin: String,
    pub checkout: String,
}

impl HotelRecord {
    /// CSV header, in serialization order.
    pub const COLUMNS: [&'static str; 15] = [
        "hotel_name",
        "star_rating",
        "rating_score",
        "location_score",
        "review_amount",
        "bed_info",
        "price",
        "breakfast_included",
        "free_cancellation",
        "no_prepayment_needed",
        "centrally_located",
        "sustainability_certification",
        "distance_from_downtown",
        "checkin",
        "checkout",
    ];
}

/// Why a task stopped retrying without reaching the acceptance threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AbandonReason {
    /// The attempt budget ran out.
    MaxAttemptsReached { attempts: u32, best_yield: usize },
    /// The same short yield kept coming back; the site has nothing more to give.
    RecordsExhausted { attempts: u32, yield_count: usize },
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::MaxAttemptsReached {
                attempts,
                best_yield,
            } => write!(
                f,
                "max attempts reached ({} attempts, best yield {})",
                attempts, best_yield
            ),
            AbandonReason::RecordsExhausted {
                attempts,
                yield_count,
            } => write!(
                f,
                "records exhausted (yield stuck at {} after {} attempts)",
                yield_count, attempts
            ),
        }
    }
}

/// Final state of one DateTask after its retry loop.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Accepted {
        records: Vec<HotelRecord>,
        attempts: u32,
    },
    Abandoned(AbandonReason),
}

impl TaskOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TaskOutcome::Accepted { .. })
    }
}
