use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    daemon::storage::entities::{DayModifier, EventEntity, Presence},
    utils::time::YearMonth,
};

/// Ordered events of a single month. Events are kept sorted by time after every mutation, which
/// lets lookups use binary search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    month: YearMonth,
    events: Vec<EventEntity>,
}

impl EventLog {
    pub fn new(month: YearMonth) -> Self {
        Self {
            month,
            events: vec![],
        }
    }

    /// Creates a log from events in any order. No validation is made here.
    pub fn from_events(month: YearMonth, mut events: Vec<EventEntity>) -> Self {
        events.sort_by_key(|v| v.time);
        Self { month, events }
    }

    pub fn month(&self) -> YearMonth {
        self.month
    }

    pub fn events(&self) -> &[EventEntity] {
        &self.events
    }

    pub fn into_events(self) -> Vec<EventEntity> {
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn first(&self) -> Option<&EventEntity> {
        self.events.first()
    }

    pub fn last(&self) -> Option<&EventEntity> {
        self.events.last()
    }

    /// Earliest event strictly after `time`.
    pub fn first_after(&self, time: DateTime<Utc>) -> Option<&EventEntity> {
        self.events.get(self.upper_bound(time))
    }

    /// Latest event strictly before `time`.
    pub fn first_before(&self, time: DateTime<Utc>) -> Option<&EventEntity> {
        self.lower_bound(time)
            .checked_sub(1)
            .and_then(|i| self.events.get(i))
    }

    pub fn contains_time(&self, time: DateTime<Utc>) -> bool {
        self.events.binary_search_by_key(&time, |v| v.time).is_ok()
    }

    pub fn first_presence(&self) -> Option<&EventEntity> {
        self.events.iter().find(|v| v.presence().is_some())
    }

    pub fn last_presence(&self) -> Option<&EventEntity> {
        self.events.iter().rev().find(|v| v.presence().is_some())
    }

    /// Earliest enter/exit event strictly after `time`.
    pub fn presence_after(&self, time: DateTime<Utc>) -> Option<&EventEntity> {
        self.events[self.upper_bound(time)..]
            .iter()
            .find(|v| v.presence().is_some())
    }

    /// Latest enter/exit event strictly before `time`.
    pub fn presence_before(&self, time: DateTime<Utc>) -> Option<&EventEntity> {
        self.events[..self.lower_bound(time)]
            .iter()
            .rev()
            .find(|v| v.presence().is_some())
    }

    /// Enter/exit events in order.
    pub fn presence(&self) -> impl Iterator<Item = (Presence, DateTime<Utc>)> + '_ {
        self.events
            .iter()
            .filter_map(|v| v.presence().map(|presence| (presence, v.time)))
    }

    /// Inserts an event at its place. The caller is responsible for keeping timestamps unique and
    /// enter/exit events alternating.
    pub fn insert(&mut self, event: EventEntity) {
        let index = self.upper_bound(event.time);
        self.events.insert(index, event);
    }

    /// Replaces the event at `time`. Returns false if there is no such event.
    pub fn replace(&mut self, time: DateTime<Utc>, with: EventEntity) -> bool {
        match self.events.binary_search_by_key(&time, |v| v.time) {
            Ok(index) => {
                self.events[index] = with;
                self.events.sort_by_key(|v| v.time);
                true
            }
            Err(_) => false,
        }
    }

    pub fn day_modifier(&self, day: NaiveDate) -> Option<DayModifier> {
        self.events
            .iter()
            .filter(|v| v.day() == day)
            .find_map(|v| v.modifier())
    }

    /// Removes every modifier of `day`. Returns true if something was removed.
    pub fn remove_modifier(&mut self, day: NaiveDate) -> bool {
        let before = self.events.len();
        self.events
            .retain(|v| !(v.modifier().is_some() && v.day() == day));
        before != self.events.len()
    }

    /// Positions of neighbouring enter/exit events sharing a type. An empty result means the log
    /// alternates.
    pub fn alternation_violations(&self) -> Vec<(usize, usize)> {
        let mut violations = vec![];
        let mut previous: Option<(usize, Presence)> = None;
        for (index, event) in self.events.iter().enumerate() {
            let Some(presence) = event.presence() else {
                continue;
            };
            if let Some((previous_index, previous_presence)) = previous {
                if previous_presence == presence {
                    violations.push((previous_index, index));
                }
            }
            previous = Some((index, presence));
        }
        violations
    }

    /// Index of the first event with time >= `time`.
    fn lower_bound(&self, time: DateTime<Utc>) -> usize {
        self.events.partition_point(|v| v.time < time)
    }

    /// Index of the first event with time > `time`.
    fn upper_bound(&self, time: DateTime<Utc>) -> usize {
        self.events.partition_point(|v| v.time <= time)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use crate::{
        daemon::storage::entities::{DayModifier, EventEntity, EventKind, Presence},
        utils::time::{local_instant, YearMonth},
    };

    use super::EventLog;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        local_instant(day(), hour, 0).unwrap()
    }

    fn sample() -> EventLog {
        EventLog::from_events(
            YearMonth::new(2024, 5).unwrap(),
            vec![
                EventEntity::new(Presence::Exit, at(17)),
                EventEntity::new(DayModifier::Sick, at(8)),
                EventEntity::new(Presence::Enter, at(9)),
            ],
        )
    }

    #[test]
    fn test_from_events_sorts() {
        let log = sample();
        let times = log.events().iter().map(|v| v.time).collect::<Vec<_>>();
        assert_eq!(times, vec![at(8), at(9), at(17)]);
        assert_eq!(log.first().unwrap().kind, EventKind::Sick);
        assert_eq!(log.last().unwrap().kind, EventKind::Exit);
        assert_eq!(log.first_presence().unwrap().kind, EventKind::Enter);
    }

    #[test]
    fn test_empty_log_accessors() {
        let log = EventLog::new(YearMonth::new(2024, 5).unwrap());
        assert!(log.is_empty());
        assert!(log.first().is_none());
        assert!(log.last().is_none());
        assert!(log.first_after(at(9)).is_none());
        assert!(log.first_before(at(9)).is_none());
    }

    #[test]
    fn test_neighbours_are_strict() {
        let log = sample();
        assert_eq!(log.first_after(at(9)).unwrap().time, at(17));
        assert_eq!(log.first_before(at(9)).unwrap().time, at(8));
        assert_eq!(log.first_after(at(12)).unwrap().time, at(17));
        assert_eq!(log.first_before(at(12)).unwrap().time, at(9));
        assert!(log.first_after(at(17)).is_none());
        assert!(log.first_before(at(8)).is_none());
        assert!(log.presence_before(at(9)).is_none());
        assert_eq!(log.presence_after(at(7)).unwrap().time, at(9));
    }

    #[test]
    fn test_contains_time() {
        let log = sample();
        assert!(log.contains_time(at(9)));
        assert!(!log.contains_time(at(10)));
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut log = sample();
        log.insert(EventEntity::new(Presence::Exit, at(12)));
        log.insert(EventEntity::new(Presence::Enter, at(13)));
        let times = log.events().iter().map(|v| v.time).collect::<Vec<_>>();
        assert_eq!(times, vec![at(8), at(9), at(12), at(13), at(17)]);
        assert!(log.alternation_violations().is_empty());
    }

    #[test]
    fn test_replace_resorts() {
        let mut log = sample();
        assert!(log.replace(at(17), EventEntity::new(Presence::Exit, at(7))));
        assert_eq!(log.first().unwrap(), &EventEntity::new(Presence::Exit, at(7)));
        assert!(!log.replace(at(17), EventEntity::new(Presence::Exit, at(7))));
    }

    #[test]
    fn test_modifiers() {
        let mut log = sample();
        assert_eq!(log.day_modifier(day()), Some(DayModifier::Sick));
        assert_eq!(log.day_modifier(day().succ_opt().unwrap()), None);
        assert!(log.remove_modifier(day()));
        assert!(!log.remove_modifier(day()));
        assert_eq!(log.day_modifier(day()), None);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_alternation_violations_skip_modifiers() {
        let log = EventLog::from_events(
            YearMonth::new(2024, 5).unwrap(),
            vec![
                EventEntity::new(Presence::Enter, at(8)),
                EventEntity::new(DayModifier::Vacation, at(9)),
                EventEntity::new(Presence::Enter, at(10)),
                EventEntity::new(Presence::Exit, at(11)),
            ],
        );
        assert_eq!(log.alternation_violations(), vec![(0, 2)]);
    }
}
