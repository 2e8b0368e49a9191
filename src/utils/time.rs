use std::{fmt::Display, str::FromStr};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Datelike, DurationRound, Local, NaiveDate, TimeDelta, TimeZone, Utc};

/// A calendar month in local time. Every month has its own event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && NaiveDate::from_ymd_opt(year, month, 1).is_some() {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Month the instant falls into in the local time zone.
    pub fn of(time: DateTime<Utc>) -> Self {
        Self::of_day(local_day(time))
    }

    pub fn of_day(day: NaiveDate) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("YearMonth is always valid")
    }

    /// Every day of the month in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let month = *self;
        self.first_day()
            .iter_days()
            .take_while(move |day| YearMonth::of_day(*day) == month)
    }

    /// The last `count` months ending with (and including) this one, oldest first.
    pub fn trailing(&self, count: usize) -> Vec<YearMonth> {
        let mut months = Vec::with_capacity(count);
        let mut current = *self;
        for _ in 0..count {
            months.push(current);
            current = current.previous();
        }
        months.reverse();
        months
    }
}

/// This is the standard way of converting a month to a string in clockin. Month isn't padded.
impl Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| anyhow!("Expected YYYY-M, got {s}"))?;
        let year = year.parse::<i32>().context("Invalid year")?;
        let month = month.parse::<u32>().context("Invalid month")?;
        YearMonth::new(year, month).ok_or_else(|| anyhow!("Month {month} is out of range"))
    }
}

/// File name of a month record.
pub fn month_to_record_name(month: YearMonth) -> String {
    format!("history-{month}.json")
}

/// Calendar day of the instant in local time.
pub fn local_day(time: DateTime<Utc>) -> NaiveDate {
    time.with_timezone(&Local).date_naive()
}

/// Timestamps are compared with millisecond precision, everything below is dropped on entry.
pub fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(time)
}

/// Converts a local wall clock date and time into an instant. Ambiguous times pick the earliest.
pub fn local_instant(day: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_opt(hour, minute, 0)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|v| v.with_timezone(&Utc))
}

/// Serializes timestamps the same way javascript `Date.toJSON` does, so stored months stay
/// readable by older clients.
pub mod millis_rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let time = DateTime::<Utc>::deserialize(deserializer)?;
        Ok(super::truncate_to_millis(time))
    }
}

/// Optional request times. Clients send either an RFC 3339 string or epoch milliseconds.
pub mod client_time {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ClientTime {
        Millis(i64),
        Text(DateTime<Utc>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let time = match Option::<ClientTime>::deserialize(deserializer)? {
            None => return Ok(None),
            Some(ClientTime::Text(time)) => time,
            Some(ClientTime::Millis(millis)) => DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| D::Error::custom(format!("Time {millis} is out of range")))?,
        };
        Ok(Some(super::truncate_to_millis(time)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use serde::Deserialize;

    use super::{month_to_record_name, truncate_to_millis, YearMonth};

    #[test]
    fn test_previous_month_wraps_year() {
        let january = YearMonth::new(2024, 1).unwrap();
        assert_eq!(january.previous(), YearMonth::new(2023, 12).unwrap());
        assert_eq!(
            YearMonth::new(2024, 7).unwrap().previous(),
            YearMonth::new(2024, 6).unwrap()
        );
    }

    #[test]
    fn test_month_key_is_not_padded() {
        let month = YearMonth::new(2024, 3).unwrap();
        assert_eq!(month.to_string(), "2024-3");
        assert_eq!(month_to_record_name(month), "history-2024-3.json");
        assert_eq!("2024-3".parse::<YearMonth>().unwrap(), month);
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("2024".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_days_of_month() {
        let february = YearMonth::new(2024, 2).unwrap();
        let days = february.days().collect::<Vec<_>>();
        assert_eq!(days.len(), 29);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(days[28], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_trailing_months() {
        let months = YearMonth::new(2024, 2).unwrap().trailing(3);
        assert_eq!(
            months,
            vec![
                YearMonth::new(2023, 12).unwrap(),
                YearMonth::new(2024, 1).unwrap(),
                YearMonth::new(2024, 2).unwrap(),
            ]
        );
    }

    #[test]
    fn test_client_time_accepts_text_and_millis() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default, deserialize_with = "super::client_time::deserialize")]
            time: Option<DateTime<Utc>>,
        }

        let expected = Utc.timestamp_opt(1_715_763_600, 0).unwrap();
        let text: Body = serde_json::from_str(r#"{"time":"2024-05-15T09:00:00.000Z"}"#).unwrap();
        assert_eq!(text.time, Some(expected));
        let millis: Body = serde_json::from_str(r#"{"time":1715763600000}"#).unwrap();
        assert_eq!(millis.time, Some(expected));
        let missing: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.time, None);
        let null: Body = serde_json::from_str(r#"{"time":null}"#).unwrap();
        assert_eq!(null.time, None);
        assert!(serde_json::from_str::<Body>(r#"{"time":"yesterday"}"#).is_err());
    }

    #[test]
    fn test_truncation_drops_sub_millis() {
        let time = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(
            truncate_to_millis(time),
            Utc.timestamp_opt(1_700_000_000, 123_000_000).unwrap()
        );
    }
}
