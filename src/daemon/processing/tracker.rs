use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    daemon::storage::{
        config_storage::{ConfigStorage, UserConfig},
        entities::{DayModifier, EventEntity, Presence},
        month_storage::{serialize_events, MonthStorage, StoredPreviousMonth},
    },
    history::{
        aggregate::{self, MonthSummary},
        event_log::EventLog,
        modifiers::{toggle_modifier, ToggleOutcome},
        reconcile::{reconcile, Decision},
    },
    utils::{
        clock::Clock,
        time::{local_day, truncate_to_millis, YearMonth},
    },
};

use super::{error::TrackerError, module::RequestProcessor, requests::TrackerRequest};

/// Worked time of the current day and whether a session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(with = "aggregate::duration_ser")]
    pub session_time: TimeDelta,
    pub is_at_work: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { events: usize },
    /// Imported content matches what is stored, nothing was written.
    Unchanged,
}

/// Owns the log of the current month and applies every change to month logs. Changes are saved
/// right after they are made.
pub struct Tracker<S: MonthStorage> {
    storage: S,
    config_storage: ConfigStorage,
    current: Option<EventLog>,
    clock: Box<dyn Clock>,
}

impl<S: MonthStorage + Sync> Tracker<S> {
    pub fn new(storage: S, config_storage: ConfigStorage, clock: Box<dyn Clock>) -> Self {
        Self {
            storage,
            config_storage,
            current: None,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(self.clock.time())
    }

    /// Takes the log of `month` out of the tracker. The in-memory log is used for the current
    /// month, any other month is read from storage.
    async fn take_log(&mut self, month: YearMonth) -> Result<EventLog, TrackerError> {
        match self.current.take() {
            Some(log) if log.month() == month => return Ok(log),
            Some(log) => self.current = Some(log),
            None => {}
        }
        Ok(self.storage.load(month).await?)
    }

    /// Gives a log back after use. Only the current month is kept in memory, a month change drops
    /// the old one.
    fn restore_log(&mut self, log: EventLog) {
        let current_month = YearMonth::of(self.now());
        if log.month() == current_month {
            self.current = Some(log);
        } else if self
            .current
            .as_ref()
            .is_some_and(|v| v.month() != current_month)
        {
            debug!("Month changed, dropping log of {}", log.month());
            self.current = None;
        }
    }

    /// Saves a changed log. A log that failed to save isn't kept, so the next request reads the
    /// stored state again.
    async fn persist(&mut self, log: EventLog) -> Result<(), TrackerError> {
        if let Err(e) = self.storage.save(&log).await {
            self.current = None;
            return Err(e.into());
        }
        self.restore_log(log);
        Ok(())
    }

    async fn read_log(&mut self, month: Option<YearMonth>) -> Result<EventLog, TrackerError> {
        let month = month.unwrap_or_else(|| YearMonth::of(self.now()));
        let log = self.take_log(month).await?;
        let copy = log.clone();
        self.restore_log(log);
        Ok(copy)
    }

    /// Records an enter or exit. The time defaults to now.
    pub async fn submit(
        &mut self,
        presence: Presence,
        time: Option<DateTime<Utc>>,
    ) -> Result<Decision, TrackerError> {
        let time = time.map(truncate_to_millis).unwrap_or_else(|| self.now());
        let mut log = self.take_log(YearMonth::of(time)).await?;

        let previous = StoredPreviousMonth(&self.storage);
        let decision = match reconcile(&mut log, presence, time, &previous).await {
            Ok(v) => v,
            Err(e) => {
                self.restore_log(log);
                return Err(e.into());
            }
        };

        match decision {
            Decision::Duplicate => {
                self.restore_log(log);
                Err(TrackerError::Duplicate(time))
            }
            decision if decision.is_mutation() => {
                self.persist(log).await?;
                info!("Recorded {presence} at {time} as {decision:?}");
                Ok(decision)
            }
            decision => {
                self.restore_log(log);
                info!("Ignored {presence} at {time}: {decision:?}");
                Ok(decision)
            }
        }
    }

    /// Sets or clears a day modifier on the day of `time`. The time defaults to now.
    pub async fn toggle_modifier(
        &mut self,
        modifier: DayModifier,
        time: Option<DateTime<Utc>>,
        state: bool,
        replace: bool,
    ) -> Result<ToggleOutcome, TrackerError> {
        let time = time.map(truncate_to_millis).unwrap_or_else(|| self.now());
        let mut log = self.take_log(YearMonth::of(time)).await?;

        let outcome = toggle_modifier(&mut log, modifier, time, state, replace);
        match outcome {
            ToggleOutcome::Conflict { existing } => {
                self.restore_log(log);
                Err(TrackerError::Conflict { existing })
            }
            ToggleOutcome::Duplicate => {
                self.restore_log(log);
                Err(TrackerError::Duplicate(time))
            }
            outcome if outcome.is_mutation() => {
                self.persist(log).await?;
                info!(
                    "Day {} {modifier} set to {state}: {outcome:?}",
                    local_day(time)
                );
                Ok(outcome)
            }
            outcome => {
                self.restore_log(log);
                Ok(outcome)
            }
        }
    }

    pub async fn session(&mut self) -> Result<Session, TrackerError> {
        let now = self.now();
        let log = self.read_log(None).await?;
        Ok(Session {
            session_time: aggregate::daily_time(&log, local_day(now), now),
            is_at_work: aggregate::is_at_work(&log, now),
        })
    }

    /// Log of `month`, the current month if none is given.
    pub async fn history(&mut self, month: Option<YearMonth>) -> Result<EventLog, TrackerError> {
        self.read_log(month).await
    }

    /// Overwrites a month with externally supplied events. Nothing is written when the content is
    /// the same as the stored one.
    pub async fn import(
        &mut self,
        month: YearMonth,
        events: Vec<EventEntity>,
    ) -> Result<ImportOutcome, TrackerError> {
        if let Some(stray) = events.iter().find(|v| YearMonth::of(v.time) != month) {
            return Err(TrackerError::validation(format!(
                "Event at {} doesn't belong to {month}",
                stray.time
            )));
        }

        let imported = EventLog::from_events(month, events);
        if let Some(pair) = imported
            .events()
            .windows(2)
            .find(|pair| pair[0].time == pair[1].time)
        {
            return Err(TrackerError::validation(format!(
                "Events {} and {} share the time {}",
                pair[0].kind, pair[1].kind, pair[0].time
            )));
        }

        let existing = self.take_log(month).await?;

        let unchanged = serialize_events(imported.events())? == serialize_events(existing.events())?;
        if unchanged {
            self.restore_log(existing);
            debug!("Import of {month} matches stored content");
            return Ok(ImportOutcome::Unchanged);
        }

        let violations = imported.alternation_violations();
        if !violations.is_empty() {
            warn!(
                "Imported {month} has {} enter/exit events out of alternation",
                violations.len()
            );
        }

        let count = imported.len();
        self.persist(imported).await?;
        info!("Imported {count} events into {month}");
        Ok(ImportOutcome::Imported { events: count })
    }

    pub async fn summary(&mut self, month: Option<YearMonth>) -> Result<MonthSummary, TrackerError> {
        let now = self.now();
        let log = self.read_log(month).await?;
        let config = self.config_storage.load().await?;
        Ok(aggregate::month_summary(&log, &config, now))
    }

    pub async fn config(&self) -> Result<UserConfig, TrackerError> {
        Ok(self.config_storage.load().await?)
    }

    pub async fn set_config(&self, config: UserConfig) -> Result<(), TrackerError> {
        if !config.daily_work_hours.is_finite() || config.daily_work_hours < 0. {
            return Err(TrackerError::validation(
                "dailyWorkHours must be a non negative number",
            ));
        }
        self.config_storage.save(&config).await?;
        info!("Saved user config");
        Ok(())
    }
}

fn send_reply<T: std::fmt::Debug>(
    reply: tokio::sync::oneshot::Sender<Result<T, TrackerError>>,
    result: Result<T, TrackerError>,
) {
    if let Err(unsent) = reply.send(result) {
        warn!("Requester left before receiving {unsent:?}");
    }
}

impl<S: MonthStorage + Sync> RequestProcessor for Tracker<S> {
    async fn process_next(&mut self, request: TrackerRequest) -> anyhow::Result<()> {
        match request {
            TrackerRequest::Submit {
                presence,
                time,
                reply,
            } => send_reply(reply, self.submit(presence, time).await),
            TrackerRequest::ToggleModifier {
                modifier,
                time,
                state,
                replace,
                reply,
            } => send_reply(
                reply,
                self.toggle_modifier(modifier, time, state, replace).await,
            ),
            TrackerRequest::Session { reply } => send_reply(reply, self.session().await),
            TrackerRequest::History { month, reply } => {
                send_reply(reply, self.history(month).await)
            }
            TrackerRequest::Import {
                month,
                events,
                reply,
            } => send_reply(reply, self.import(month, events).await),
            TrackerRequest::Summary { month, reply } => {
                send_reply(reply, self.summary(month).await)
            }
            TrackerRequest::GetConfig { reply } => send_reply(reply, self.config().await),
            TrackerRequest::SetConfig { config, reply } => {
                send_reply(reply, self.set_config(config).await)
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> anyhow::Result<()> {
        // Every change is saved when it's made, the in-memory log can simply be dropped.
        if let Some(log) = self.current.take() {
            debug!("Releasing log of {} with {} events", log.month(), log.len());
        }
        Ok(())
    }
}
