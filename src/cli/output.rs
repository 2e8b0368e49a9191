//! Human readable output of cli commands.

use ansi_term::Colour;
use chrono::{DateTime, Local, TimeDelta, Utc};

use crate::{
    daemon::{
        processing::{error::TrackerError, tracker::ImportOutcome, tracker::Session},
        storage::{
            config_storage::UserConfig,
            entities::{DayModifier, EventKind, Presence},
        },
    },
    history::{
        aggregate::{month_summary, DaySummary},
        event_log::EventLog,
        reconcile::{Decision, IgnoreReason},
    },
    utils::time::YearMonth,
};

pub fn format_duration(v: TimeDelta) -> String {
    let sign = if v < TimeDelta::zero() { "-" } else { "" };
    let v = v.abs();
    if v.num_hours() > 0 {
        format!("{sign}{}h{:02}m", v.num_hours(), v.num_minutes() % 60)
    } else {
        format!("{sign}{}m", v.num_minutes() % 60)
    }
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M").to_string()
}

fn modifier_colour(modifier: DayModifier) -> Colour {
    match modifier {
        DayModifier::Sick => Colour::Purple,
        DayModifier::Vacation => Colour::Cyan,
    }
}

fn balance_colour(balance: TimeDelta) -> Colour {
    if balance < TimeDelta::zero() {
        Colour::Red
    } else {
        Colour::Green
    }
}

pub fn print_rejection(error: &TrackerError) {
    println!("{}", Colour::Yellow.paint(error.to_string()));
}

pub fn print_decision(presence: Presence, decision: &Decision) {
    let message = match decision {
        Decision::Insert => format!("Recorded {presence}"),
        Decision::ReplaceFirst { existing } | Decision::ReplaceNext { existing } => {
            format!("Moved {presence} from {}", local_time(*existing))
        }
        Decision::Ignore(reason) => {
            let reason = match reason {
                IgnoreReason::PreviousMonthSameType => "previous month already ends with it",
                IgnoreReason::TrailingSameType => "the last event is already the same",
                IgnoreReason::PrecededBySameType => "the event before is already the same",
            };
            format!("Ignored {presence}, {reason}")
        }
        Decision::Duplicate => format!("{presence} is already recorded"),
    };
    let colour = if decision.is_mutation() {
        Colour::Green
    } else {
        Colour::Yellow
    };
    println!("{}", colour.paint(message));
}

pub fn print_session(session: &Session) {
    let state = if session.is_at_work {
        Colour::Green.paint("at work")
    } else {
        Colour::White.dimmed().paint("away")
    };
    println!(
        "Today {}\t{state}",
        Colour::White.bold().paint(format_duration(session.session_time))
    );
}

pub fn print_import(month: YearMonth, outcome: &ImportOutcome) {
    match outcome {
        ImportOutcome::Imported { events } => println!(
            "{}",
            Colour::Green.paint(format!("Imported {events} events into {month}"))
        ),
        ImportOutcome::Unchanged => println!("History of {month} is already up to date"),
    }
}

/// One line per day: date, events, worked time and the day mark.
fn day_line(day: &DaySummary) -> String {
    let events = day
        .events
        .iter()
        .filter_map(|v| match v.kind {
            EventKind::Enter => Some(local_time(v.time)),
            EventKind::Exit => Some(format!("-{}", local_time(v.time))),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ");
    let modifier = day
        .modifier
        .map(|v| modifier_colour(v).paint(v.to_string()).to_string())
        .unwrap_or_default();
    format!(
        "{}\t{}\t{}\t{}",
        day.day.format("%a %d.%m"),
        format_duration(day.worked),
        events,
        modifier
    )
}

pub fn month_lines(log: &EventLog, config: &UserConfig, now: DateTime<Utc>) -> Vec<String> {
    let summary = month_summary(log, config, now);
    let mut lines = vec![Colour::White.bold().paint(summary.month.as_str()).to_string()];
    if summary.days.is_empty() {
        lines.push("No records".to_string());
        return lines;
    }
    lines.extend(summary.days.iter().map(day_line));
    lines.push(format!(
        "Worked {} of {}\tbalance {}\tsick {}\tvacation {}",
        format_duration(summary.worked),
        format_duration(summary.expected),
        balance_colour(summary.balance).paint(format_duration(summary.balance)),
        summary.sick_days,
        summary.vacation_days
    ));
    lines
}

pub fn print_month(log: &EventLog, config: &UserConfig, now: DateTime<Utc>) {
    for line in month_lines(log, config, now) {
        println!("{line}");
    }
    println!();
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

    use super::{format_duration, month_lines};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        local_instant(NaiveDate::from_ymd_opt(2024, 5, day).unwrap(), hour, 0).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(TimeDelta::minutes(5)), "5m");
        assert_eq!(format_duration(TimeDelta::minutes(125)), "2h05m");
        assert_eq!(format_duration(TimeDelta::minutes(-90)), "-1h30m");
        assert_eq!(format_duration(TimeDelta::zero()), "0m");
    }

    #[test]
    fn test_month_lines() {
        let log = EventLog::from_events(
            YearMonth::new(2024, 5).unwrap(),
            vec![
                EventEntity::new(Presence::Enter, at(2, 9)),
                EventEntity::new(Presence::Exit, at(2, 17)),
                EventEntity::new(DayModifier::Sick, at(3, 8)),
            ],
        );
        let lines = month_lines(&log, &UserConfig::default(), at(3, 12));
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("2024-5"));
        assert!(lines[1].starts_with("Thu 02.05\t8h00m\t09:00 -17:00"));
        assert!(lines[2].contains("sick"));
        assert!(lines[3].starts_with("Worked 8h00m of 16h00m"));
    }

    #[test]
    fn test_empty_month() {
        let log = EventLog::new(YearMonth::new(2024, 5).unwrap());
        let lines = month_lines(&log, &UserConfig::default(), at(3, 12));
        assert_eq!(lines[1], "No records");
    }
}
