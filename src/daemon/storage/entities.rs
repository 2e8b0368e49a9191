use std::{fmt::Display, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::{local_day, millis_rfc3339};

/// Arrival or departure. Only these take part in the alternation of a month log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Enter,
    Exit,
}

impl Presence {
    pub fn opposite(self) -> Presence {
        match self {
            Presence::Enter => Presence::Exit,
            Presence::Exit => Presence::Enter,
        }
    }
}

/// Whole day annotation. At most one is present on a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayModifier {
    Sick,
    Vacation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enter,
    Exit,
    Sick,
    Vacation,
}

impl EventKind {
    pub fn presence(self) -> Option<Presence> {
        match self {
            EventKind::Enter => Some(Presence::Enter),
            EventKind::Exit => Some(Presence::Exit),
            EventKind::Sick | EventKind::Vacation => None,
        }
    }

    pub fn modifier(self) -> Option<DayModifier> {
        match self {
            EventKind::Sick => Some(DayModifier::Sick),
            EventKind::Vacation => Some(DayModifier::Vacation),
            EventKind::Enter | EventKind::Exit => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Enter => "enter",
            EventKind::Exit => "exit",
            EventKind::Sick => "sick",
            EventKind::Vacation => "vacation",
        }
    }
}

impl From<Presence> for EventKind {
    fn from(value: Presence) -> Self {
        match value {
            Presence::Enter => EventKind::Enter,
            Presence::Exit => EventKind::Exit,
        }
    }
}

impl From<DayModifier> for EventKind {
    fn from(value: DayModifier) -> Self {
        match value {
            DayModifier::Sick => EventKind::Sick,
            DayModifier::Vacation => EventKind::Vacation,
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        EventKind::from(*self).fmt(f)
    }
}

impl Display for DayModifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        EventKind::from(*self).fmt(f)
    }
}

impl FromStr for DayModifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sick" => Ok(DayModifier::Sick),
            "vacation" => Ok(DayModifier::Vacation),
            other => Err(anyhow!("Unknown day modifier {other}")),
        }
    }
}

/// A single entry of a month log as it's stored on the disk.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy)]
pub struct EventEntity {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(with = "millis_rfc3339")]
    pub time: DateTime<Utc>,
}

impl EventEntity {
    pub fn new(kind: impl Into<EventKind>, time: DateTime<Utc>) -> Self {
        Self {
            kind: kind.into(),
            time,
        }
    }

    pub fn presence(&self) -> Option<Presence> {
        self.kind.presence()
    }

    pub fn modifier(&self) -> Option<DayModifier> {
        self.kind.modifier()
    }

    /// Local calendar day of the event.
    pub fn day(&self) -> NaiveDate {
        local_day(self.time)
    }
}
