use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::daemon::storage::entities::DayModifier;

/// Failures reported to whoever sent a request to the tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The same instant is already recorded. Resubmitting won't help.
    #[error("Time {0} already exists in history")]
    Duplicate(DateTime<Utc>),

    /// The day already carries another modifier and replacement wasn't requested.
    #[error("Day is already marked as {existing}")]
    Conflict { existing: DayModifier },

    /// The request was rejected before touching any log.
    #[error("{0}")]
    Validation(String),

    /// Reading or writing a month failed. The change isn't durable.
    #[error("Storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("Tracker is not running")]
    Unavailable,
}

impl TrackerError {
    pub fn validation(message: impl Into<String>) -> Self {
        TrackerError::Validation(message.into())
    }
}
