use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    daemon::storage::entities::{DayModifier, EventEntity},
    utils::time::local_day,
};

use super::event_log::EventLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    /// The existing modifier was removed and the requested one added.
    Replaced { previous: DayModifier },
    Removed,
    /// Nothing to do, the day is already in the requested state.
    Unchanged,
    /// A different modifier is present and replacement wasn't requested.
    Conflict { existing: DayModifier },
    /// The timestamp of the new modifier is already taken by another event.
    Duplicate,
}

impl ToggleOutcome {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ToggleOutcome::Added | ToggleOutcome::Replaced { .. } | ToggleOutcome::Removed
        )
    }
}

/// Sets or clears `modifier` on the local day of `time`. A new modifier event is recorded at
/// `time`.
pub fn toggle_modifier(
    log: &mut EventLog,
    modifier: DayModifier,
    time: DateTime<Utc>,
    state: bool,
    replace: bool,
) -> ToggleOutcome {
    let day = local_day(time);
    let current = log.day_modifier(day);

    if !state {
        return if current == Some(modifier) {
            log.remove_modifier(day);
            ToggleOutcome::Removed
        } else {
            ToggleOutcome::Unchanged
        };
    }

    match current {
        Some(existing) if existing == modifier => ToggleOutcome::Unchanged,
        Some(existing) if !replace => ToggleOutcome::Conflict { existing },
        Some(existing) => {
            // The replaced mark may hold the requested timestamp itself.
            if taken_by_other_than(log, time, day, existing) {
                return ToggleOutcome::Duplicate;
            }
            log.remove_modifier(day);
            log.insert(EventEntity::new(modifier, time));
            ToggleOutcome::Replaced { previous: existing }
        }
        None if log.contains_time(time) => ToggleOutcome::Duplicate,
        None => {
            log.insert(EventEntity::new(modifier, time));
            ToggleOutcome::Added
        }
    }
}

fn taken_by_other_than(
    log: &EventLog,
    time: DateTime<Utc>,
    day: NaiveDate,
    modifier: DayModifier,
) -> bool {
    log.events()
        .iter()
        .any(|v| v.time == time && !(v.modifier() == Some(modifier) && v.day() == day))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use crate::{
        daemon::storage::entities::{DayModifier, EventEntity, Presence},
        history::event_log::EventLog,
        utils::time::{local_instant, YearMonth},
    };

    use super::{toggle_modifier, ToggleOutcome};

    fn at(hour: u32) -> DateTime<Utc> {
        local_instant(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(), hour, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn empty() -> EventLog {
        EventLog::new(YearMonth::new(2024, 5).unwrap())
    }

    #[test]
    fn test_add_then_idempotent() {
        let mut log = empty();
        assert_eq!(
            toggle_modifier(&mut log, DayModifier::Sick, at(8), true, false),
            ToggleOutcome::Added
        );
        assert_eq!(
            toggle_modifier(&mut log, DayModifier::Sick, at(9), true, false),
            ToggleOutcome::Unchanged
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log.day_modifier(day()), Some(DayModifier::Sick));
    }

    #[test]
    fn test_conflict_requires_replace() {
        let mut log = empty();
        toggle_modifier(&mut log, DayModifier::Sick, at(8), true, false);

        let outcome = toggle_modifier(&mut log, DayModifier::Vacation, at(9), true, false);
        assert_eq!(
            outcome,
            ToggleOutcome::Conflict {
                existing: DayModifier::Sick
            }
        );
        assert!(!outcome.is_mutation());
        assert_eq!(log.day_modifier(day()), Some(DayModifier::Sick));

        let outcome = toggle_modifier(&mut log, DayModifier::Vacation, at(9), true, true);
        assert_eq!(
            outcome,
            ToggleOutcome::Replaced {
                previous: DayModifier::Sick
            }
        );
        assert_eq!(log.day_modifier(day()), Some(DayModifier::Vacation));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut log = empty();
        toggle_modifier(&mut log, DayModifier::Vacation, at(8), true, false);
        assert_eq!(
            toggle_modifier(&mut log, DayModifier::Sick, at(9), false, false),
            ToggleOutcome::Unchanged
        );
        assert_eq!(
            toggle_modifier(&mut log, DayModifier::Vacation, at(9), false, false),
            ToggleOutcome::Removed
        );
        assert!(log.is_empty());
        assert_eq!(
            toggle_modifier(&mut log, DayModifier::Vacation, at(9), false, false),
            ToggleOutcome::Unchanged
        );
    }

    #[test]
    fn test_replace_at_timestamp_of_replaced_mark() {
        let mut log = empty();
        toggle_modifier(&mut log, DayModifier::Sick, at(8), true, false);

        let outcome = toggle_modifier(&mut log, DayModifier::Vacation, at(8), true, true);
        assert_eq!(
            outcome,
            ToggleOutcome::Replaced {
                previous: DayModifier::Sick
            }
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log.day_modifier(day()), Some(DayModifier::Vacation));
        assert_eq!(log.first().unwrap().time, at(8));
    }

    #[test]
    fn test_replace_on_timestamp_of_presence_event() {
        let mut log = empty();
        log.insert(EventEntity::new(Presence::Enter, at(9)));
        toggle_modifier(&mut log, DayModifier::Sick, at(8), true, false);

        assert_eq!(
            toggle_modifier(&mut log, DayModifier::Vacation, at(9), true, true),
            ToggleOutcome::Duplicate
        );
        assert_eq!(log.day_modifier(day()), Some(DayModifier::Sick));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_modifier_on_taken_timestamp() {
        let mut log = empty();
        log.insert(EventEntity::new(Presence::Enter, at(8)));
        assert_eq!(
            toggle_modifier(&mut log, DayModifier::Sick, at(8), true, false),
            ToggleOutcome::Duplicate
        );
        assert_eq!(log.len(), 1);
    }
}
