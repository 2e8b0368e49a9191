use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use crate::{
    daemon::storage::{
        config_storage::UserConfig,
        entities::{DayModifier, EventEntity, Presence},
    },
    utils::time::{local_day, YearMonth},
};

use super::event_log::EventLog;

/// Time worked on `day`. Events are paired in order, an unpaired trailing event is closed with
/// `now` for the purpose of this calculation only. The open session is assumed to be running
/// even when `day` is in the past.
pub fn daily_time(log: &EventLog, day: NaiveDate, now: DateTime<Utc>) -> TimeDelta {
    let mut times = log
        .presence()
        .filter(|(_, time)| local_day(*time) == day)
        .map(|(_, time)| time)
        .collect::<Vec<_>>();

    if times.len() % 2 != 0 {
        times.push(now);
    }

    times
        .chunks_exact(2)
        .map(|pair| pair[1] - pair[0])
        .fold(TimeDelta::zero(), |acc, v| acc + v)
}

/// Whether the latest enter/exit event is an enter made in the current month.
///
/// Day marks are skipped on purpose: being marked sick after arriving doesn't end the session.
pub fn is_at_work(log: &EventLog, now: DateTime<Utc>) -> bool {
    log.last_presence().is_some_and(|v| {
        YearMonth::of(v.time) == YearMonth::of(now) && v.presence() == Some(Presence::Enter)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub day: NaiveDate,
    #[serde(with = "duration_ser")]
    pub worked: TimeDelta,
    pub modifier: Option<DayModifier>,
    pub events: Vec<EventEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: String,
    pub days: Vec<DaySummary>,
    #[serde(with = "duration_ser")]
    pub worked: TimeDelta,
    /// Target time of working days up to `now`, excluding holidays and days with a modifier.
    #[serde(with = "duration_ser")]
    pub expected: TimeDelta,
    #[serde(with = "duration_ser")]
    pub balance: TimeDelta,
    pub sick_days: u32,
    pub vacation_days: u32,
}

/// Summarizes every day of the month that has events.
pub fn month_summary(log: &EventLog, config: &UserConfig, now: DateTime<Utc>) -> MonthSummary {
    let mut days: Vec<DaySummary> = vec![];
    for event in log.events() {
        let day = event.day();
        match days.last_mut() {
            Some(summary) if summary.day == day => summary.events.push(*event),
            _ => days.push(DaySummary {
                day,
                worked: TimeDelta::zero(),
                modifier: None,
                events: vec![*event],
            }),
        }
    }

    for summary in days.iter_mut() {
        summary.worked = daily_time(log, summary.day, now);
        summary.modifier = log.day_modifier(summary.day);
    }

    let worked = days
        .iter()
        .fold(TimeDelta::zero(), |acc, v| acc + v.worked);
    let count = |modifier: DayModifier| {
        days.iter()
            .filter(|v| v.modifier == Some(modifier))
            .count() as u32
    };
    let sick_days = count(DayModifier::Sick);
    let vacation_days = count(DayModifier::Vacation);
    let expected = expected_time(log, config, local_day(now));

    MonthSummary {
        month: log.month().to_string(),
        days,
        worked,
        expected,
        balance: worked - expected,
        sick_days,
        vacation_days,
    }
}

fn expected_time(log: &EventLog, config: &UserConfig, today: NaiveDate) -> TimeDelta {
    let working_days = config.working_weekdays();
    let holidays = config.holiday_dates();
    let daily = TimeDelta::milliseconds((config.daily_work_hours * 3_600_000.) as i64);

    let counted = log
        .month()
        .days()
        .filter(|day| *day <= today)
        .filter(|day| working_days.contains(&day.weekday()))
        .filter(|day| !holidays.contains(day))
        .filter(|day| log.day_modifier(*day).is_none())
        .count() as i32;

    daily * counted
}

/// Durations are exchanged as milliseconds.
pub mod duration_ser {
    use chrono::TimeDelta;
    use serde::Serializer;

    pub fn serialize<S>(duration: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

    use crate::{
        daemon::storage::{
            config_storage::UserConfig,
            entities::{DayModifier, EventEntity, Presence},
        },
        history::event_log::EventLog,
        utils::time::{local_instant, YearMonth},
    };

    use super::{daily_time, is_at_work, month_summary};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn at(d: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        local_instant(day(d), hour, minute).unwrap()
    }

    fn log(events: Vec<EventEntity>) -> EventLog {
        EventLog::from_events(YearMonth::new(2024, 5).unwrap(), events)
    }

    #[test]
    fn test_open_session_runs_until_now() {
        let log = log(vec![EventEntity::new(Presence::Enter, at(15, 9, 0))]);
        assert_eq!(
            daily_time(&log, day(15), at(15, 9, 30)),
            TimeDelta::minutes(30)
        );
    }

    #[test]
    fn test_closed_sessions_are_summed() {
        let log = log(vec![
            EventEntity::new(Presence::Enter, at(15, 9, 0)),
            EventEntity::new(Presence::Exit, at(15, 12, 0)),
            EventEntity::new(DayModifier::Sick, at(15, 12, 30)),
            EventEntity::new(Presence::Enter, at(15, 13, 0)),
            EventEntity::new(Presence::Exit, at(15, 17, 15)),
            EventEntity::new(Presence::Enter, at(16, 9, 0)),
        ]);
        assert_eq!(
            daily_time(&log, day(15), at(20, 0, 0)),
            TimeDelta::minutes(7 * 60 + 15)
        );
        assert_eq!(daily_time(&log, day(14), at(20, 0, 0)), TimeDelta::zero());
    }

    #[test]
    fn test_past_day_with_dangling_enter_counts_until_now() {
        let log = log(vec![EventEntity::new(Presence::Enter, at(15, 9, 0))]);
        assert_eq!(
            daily_time(&log, day(15), at(16, 9, 0)),
            TimeDelta::hours(24)
        );
    }

    #[test]
    fn test_is_at_work() {
        let empty = log(vec![]);
        assert!(!is_at_work(&empty, at(15, 10, 0)));

        let entered = log(vec![
            EventEntity::new(Presence::Enter, at(15, 9, 0)),
            EventEntity::new(DayModifier::Vacation, at(15, 9, 30)),
        ]);
        assert!(is_at_work(&entered, at(15, 10, 0)));

        let next_month = local_instant(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 10, 0)
            .unwrap();
        assert!(!is_at_work(&entered, next_month));

        let left = log(vec![
            EventEntity::new(Presence::Enter, at(15, 9, 0)),
            EventEntity::new(Presence::Exit, at(15, 17, 0)),
        ]);
        assert!(!is_at_work(&left, at(15, 18, 0)));
    }

    #[test]
    fn test_month_summary() {
        let log = log(vec![
            // 2024-05-13 is a monday
            EventEntity::new(Presence::Enter, at(13, 9, 0)),
            EventEntity::new(Presence::Exit, at(13, 18, 0)),
            EventEntity::new(DayModifier::Sick, at(14, 8, 0)),
            EventEntity::new(Presence::Enter, at(15, 9, 0)),
            EventEntity::new(Presence::Exit, at(15, 16, 0)),
        ]);
        let config = UserConfig {
            working_days: vec!["mon".into(), "tue".into(), "wed".into()],
            holidays: vec!["2024-05-01".into()],
            ..UserConfig::default()
        };

        let summary = month_summary(&log, &config, at(15, 20, 0));

        assert_eq!(summary.month, "2024-5");
        assert_eq!(summary.days.len(), 3);
        assert_eq!(summary.days[1].modifier, Some(DayModifier::Sick));
        assert_eq!(summary.worked, TimeDelta::hours(16));
        assert_eq!(summary.sick_days, 1);
        assert_eq!(summary.vacation_days, 0);
        // Mondays to wednesdays up to the 15th are the 1st, 6, 7, 8, 13, 14 and 15. The 1st is a
        // holiday and the 14th a sick day.
        assert_eq!(summary.expected, TimeDelta::hours(8 * 5));
        assert_eq!(summary.balance, TimeDelta::hours(16 - 40));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["worked"], 16 * 3_600_000);
        assert_eq!(json["sickDays"], 1);
    }
}
