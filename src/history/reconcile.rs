//! Decides what happens to an enter/exit event that arrives for a month log.
//!
//! Events can arrive late and out of order, because offline clients replay their queue once they
//! reconnect. The log is treated as authoritative and every incoming event is either redundant,
//! a correction of an existing boundary, or a new alternation point. Two consecutive events of the
//! same type never end up in the log.
//!
//! ```text
//! event before | event after | enter           | exit
//! none         | none        | add             | add
//! none         | exit        | add if previous | replace after
//!              |             | month allows    |
//! none         | enter       | replace after   | add if previous month allows
//! exit         | none        | add             | do nothing
//! enter        | none        | do nothing      | add
//! exit         | enter       | replace after   | do nothing
//! enter        | exit        | do nothing      | replace after
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    daemon::storage::entities::{EventEntity, Presence},
    utils::time::YearMonth,
};

use super::event_log::EventLog;

/// Gives the reconciler access to the month before the one being modified. It's only consulted
/// when an event lands before everything else in its month.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreviousMonthProvider: Send + Sync {
    /// Loads the log of the month preceding `month`.
    async fn previous_month(&self, month: YearMonth) -> Result<EventLog>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The exact timestamp is already recorded.
    Duplicate,
    Insert,
    /// The candidate moves the first enter/exit event of the month.
    ReplaceFirst { existing: DateTime<Utc> },
    /// The candidate moves the following event of the same type to an earlier time.
    ReplaceNext { existing: DateTime<Utc> },
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Previous month already ends with an event of the same type.
    PreviousMonthSameType,
    /// Log already ends with an event of the same type.
    TrailingSameType,
    /// Event right before already has the same type.
    PrecededBySameType,
}

impl Decision {
    /// Whether applying the decision changes the log.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Decision::Insert | Decision::ReplaceFirst { .. } | Decision::ReplaceNext { .. }
        )
    }

    /// Applies the decision to the log. Returns true when the log changed.
    pub fn apply(&self, log: &mut EventLog, candidate: EventEntity) -> bool {
        match *self {
            Decision::Insert => {
                log.insert(candidate);
                true
            }
            Decision::ReplaceFirst { existing } | Decision::ReplaceNext { existing } => {
                log.replace(existing, candidate)
            }
            Decision::Duplicate | Decision::Ignore(_) => false,
        }
    }
}

/// Computes the decision for `(presence, time)` without touching the log.
pub async fn decide(
    log: &EventLog,
    presence: Presence,
    time: DateTime<Utc>,
    previous: &dyn PreviousMonthProvider,
) -> Result<Decision> {
    if log.contains_time(time) {
        return Ok(Decision::Duplicate);
    }

    let before = log.presence_before(time).and_then(|v| v.presence().map(|p| (p, v.time)));
    let after = log.presence_after(time).and_then(|v| v.presence().map(|p| (p, v.time)));

    let decision = match (before, after) {
        // First record of the month.
        (None, None) => Decision::Insert,
        (None, Some((first, first_time))) => {
            if first == presence {
                Decision::ReplaceFirst {
                    existing: first_time,
                }
            } else {
                // Day marks closing the previous month don't count, only its last enter/exit
                // decides.
                let previous_log = previous.previous_month(log.month()).await?;
                let previous_last = previous_log.last_presence().and_then(|v| v.presence());
                debug!(
                    "Event {presence} precedes month {}, previous month ends with {previous_last:?}",
                    log.month()
                );
                if previous_last == Some(presence) {
                    Decision::Ignore(IgnoreReason::PreviousMonthSameType)
                } else {
                    Decision::Insert
                }
            }
        }
        (Some((last, _)), None) => {
            if last == presence {
                Decision::Ignore(IgnoreReason::TrailingSameType)
            } else {
                Decision::Insert
            }
        }
        (Some((prev, _)), Some((next, next_time))) => {
            if prev == presence {
                Decision::Ignore(IgnoreReason::PrecededBySameType)
            } else if next == presence.opposite() {
                Decision::Insert
            } else {
                Decision::ReplaceNext {
                    existing: next_time,
                }
            }
        }
    };

    Ok(decision)
}

/// Decides and applies the outcome for `(presence, time)`.
pub async fn reconcile(
    log: &mut EventLog,
    presence: Presence,
    time: DateTime<Utc>,
    previous: &dyn PreviousMonthProvider,
) -> Result<Decision> {
    let decision = decide(log, presence, time, previous).await?;
    debug!("Reconciled {presence} at {time} into {decision:?}");
    decision.apply(log, EventEntity::new(presence, time));
    Ok(decision)
}
