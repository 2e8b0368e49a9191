use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::{
    daemon::storage::{
        config_storage::UserConfig,
        entities::{DayModifier, EventEntity, Presence},
    },
    history::{
        aggregate::MonthSummary, event_log::EventLog, modifiers::ToggleOutcome,
        reconcile::Decision,
    },
    utils::time::YearMonth,
};

use super::{
    error::TrackerError,
    tracker::{ImportOutcome, Session},
};

pub type Reply<T> = oneshot::Sender<Result<T, TrackerError>>;

/// Everything the tracker can be asked to do. Each request carries the channel its answer is sent
/// to.
#[derive(Debug)]
pub enum TrackerRequest {
    Submit {
        presence: Presence,
        time: Option<DateTime<Utc>>,
        reply: Reply<Decision>,
    },
    ToggleModifier {
        modifier: DayModifier,
        time: Option<DateTime<Utc>>,
        state: bool,
        replace: bool,
        reply: Reply<ToggleOutcome>,
    },
    Session {
        reply: Reply<Session>,
    },
    History {
        month: Option<YearMonth>,
        reply: Reply<EventLog>,
    },
    Import {
        month: YearMonth,
        events: Vec<EventEntity>,
        reply: Reply<ImportOutcome>,
    },
    Summary {
        month: Option<YearMonth>,
        reply: Reply<MonthSummary>,
    },
    GetConfig {
        reply: Reply<UserConfig>,
    },
    SetConfig {
        config: UserConfig,
        reply: Reply<()>,
    },
}

impl TrackerRequest {
    pub fn name(&self) -> &'static str {
        match self {
            TrackerRequest::Submit { .. } => "submit",
            TrackerRequest::ToggleModifier { .. } => "toggle modifier",
            TrackerRequest::Session { .. } => "session",
            TrackerRequest::History { .. } => "history",
            TrackerRequest::Import { .. } => "import",
            TrackerRequest::Summary { .. } => "summary",
            TrackerRequest::GetConfig { .. } => "get config",
            TrackerRequest::SetConfig { .. } => "set config",
        }
    }
}

/// Cloneable front of the processing module. Used by request handlers that can run concurrently.
#[derive(Clone)]
pub struct TrackerHandle {
    sender: mpsc::Sender<TrackerRequest>,
}

impl TrackerHandle {
    pub fn new(sender: mpsc::Sender<TrackerRequest>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> TrackerRequest,
    ) -> Result<T, TrackerError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(request(reply))
            .await
            .map_err(|_| TrackerError::Unavailable)?;
        response.await.map_err(|_| TrackerError::Unavailable)?
    }

    pub async fn submit(
        &self,
        presence: Presence,
        time: Option<DateTime<Utc>>,
    ) -> Result<Decision, TrackerError> {
        self.call(|reply| TrackerRequest::Submit {
            presence,
            time,
            reply,
        })
        .await
    }

    pub async fn toggle_modifier(
        &self,
        modifier: DayModifier,
        time: Option<DateTime<Utc>>,
        state: bool,
        replace: bool,
    ) -> Result<ToggleOutcome, TrackerError> {
        self.call(|reply| TrackerRequest::ToggleModifier {
            modifier,
            time,
            state,
            replace,
            reply,
        })
        .await
    }

    pub async fn session(&self) -> Result<Session, TrackerError> {
        self.call(|reply| TrackerRequest::Session { reply }).await
    }

    pub async fn history(&self, month: Option<YearMonth>) -> Result<EventLog, TrackerError> {
        self.call(|reply| TrackerRequest::History { month, reply })
            .await
    }

    pub async fn import(
        &self,
        month: YearMonth,
        events: Vec<EventEntity>,
    ) -> Result<ImportOutcome, TrackerError> {
        self.call(|reply| TrackerRequest::Import {
            month,
            events,
            reply,
        })
        .await
    }

    pub async fn summary(&self, month: Option<YearMonth>) -> Result<MonthSummary, TrackerError> {
        self.call(|reply| TrackerRequest::Summary { month, reply })
            .await
    }

    pub async fn config(&self) -> Result<UserConfig, TrackerError> {
        self.call(|reply| TrackerRequest::GetConfig { reply }).await
    }

    pub async fn set_config(&self, config: UserConfig) -> Result<(), TrackerError> {
        self.call(|reply| TrackerRequest::SetConfig { config, reply })
            .await
    }
}
