use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the page driver, the sink and config resolution.
///
/// Most of these are recovered close to where they happen (a field falls back
/// to its sentinel, a click falls back to the last-resort click). Only sink
/// and config errors are meant to reach the binary.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("timed out after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("target closed: {0}")]
    TargetClosed(String),

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("page automation failed: {0}")]
    Automation(String),

    #[error("invalid date task: checkout {checkout} is not after checkin {checkin}")]
    InvalidDateTask {
        checkin: chrono::NaiveDate,
        checkout: chrono::NaiveDate,
    },

    #[error("output schema mismatch in {path}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SweepError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        SweepError::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SweepError::Timeout { .. })
    }

    /// The page or browser went away underneath us; no recovery click will help.
    pub fn is_target_closed(&self) -> bool {
        match self {
            SweepError::TargetClosed(_) => true,
            SweepError::Automation(msg) => msg.contains("Target closed"),
            _ => false,
        }
    }
}

pub type SweepResult<T> = std::result::Result<T, SweepError>;
