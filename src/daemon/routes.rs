//! HTTP surface of the daemon. Handlers only translate between json and [TrackerHandle] calls.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{ETAG, IF_NONE_MATCH},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::{
    daemon::{
        processing::{error::TrackerError, requests::TrackerHandle, tracker::ImportOutcome},
        storage::{
            config_storage::UserConfig,
            entities::{DayModifier, EventEntity, Presence},
            month_storage::serialize_events,
        },
    },
    utils::time::{client_time, YearMonth},
};

#[derive(Clone)]
struct ApiState {
    handle: TrackerHandle,
}

pub fn router(handle: TrackerHandle) -> Router {
    Router::new()
        .route("/api/enter", post(enter))
        .route("/api/exit", post(exit))
        .route("/api/sick", post(sick))
        .route("/api/vacation", post(vacation))
        .route("/api/sessionTime", get(session_time))
        .route("/api/history", get(history))
        .route("/api/importMonth", post(import_month))
        .route("/api/summary", get(summary))
        .route("/api/config", get(get_config).post(set_config))
        .with_state(ApiState { handle })
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        match self {
            TrackerError::Duplicate(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Time already exists in history",
            )
                .into_response(),
            TrackerError::Conflict { existing } => {
                (StatusCode::CONFLICT, Json(json!({ "conflict": existing }))).into_response()
            }
            TrackerError::Validation(message) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            TrackerError::Storage(e) => {
                error!("Request failed on storage {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            TrackerError::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
            }
        }
    }
}

/// Parses a json body. An empty body means defaults.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, TrackerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| TrackerError::validation(format!("Invalid request body: {e}")))
}

#[derive(Debug, Default, Deserialize)]
struct EventBody {
    /// Set by clients replaying requests made while offline.
    #[serde(default, deserialize_with = "client_time::deserialize")]
    time: Option<DateTime<Utc>>,
}

async fn submit(state: ApiState, presence: Presence, body: Bytes) -> Result<StatusCode, TrackerError> {
    let EventBody { time } = parse_body(&body)?;
    state.handle.submit(presence, time).await?;
    Ok(StatusCode::OK)
}

async fn enter(State(state): State<ApiState>, body: Bytes) -> Result<StatusCode, TrackerError> {
    submit(state, Presence::Enter, body).await
}

async fn exit(State(state): State<ApiState>, body: Bytes) -> Result<StatusCode, TrackerError> {
    submit(state, Presence::Exit, body).await
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ModifierBody {
    state: bool,
    #[serde(deserialize_with = "client_time::deserialize")]
    time: Option<DateTime<Utc>>,
    replace: bool,
}

impl Default for ModifierBody {
    fn default() -> Self {
        Self {
            state: true,
            time: None,
            replace: false,
        }
    }
}

async fn toggle(
    state: ApiState,
    modifier: DayModifier,
    body: Bytes,
) -> Result<StatusCode, TrackerError> {
    let ModifierBody {
        state: enabled,
        time,
        replace,
    } = parse_body(&body)?;
    state
        .handle
        .toggle_modifier(modifier, time, enabled, replace)
        .await?;
    Ok(StatusCode::OK)
}

async fn sick(State(state): State<ApiState>, body: Bytes) -> Result<StatusCode, TrackerError> {
    toggle(state, DayModifier::Sick, body).await
}

async fn vacation(State(state): State<ApiState>, body: Bytes) -> Result<StatusCode, TrackerError> {
    toggle(state, DayModifier::Vacation, body).await
}

async fn session_time(State(state): State<ApiState>) -> Result<Response, TrackerError> {
    Ok(Json(state.handle.session().await?).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct MonthQuery {
    year: Option<String>,
    month: Option<String>,
}

impl MonthQuery {
    /// Requested month, `None` for the current one.
    fn resolve(&self) -> Result<Option<YearMonth>, TrackerError> {
        match (&self.year, &self.month) {
            (Some(year), Some(month)) => {
                let year = year
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| TrackerError::validation("Invalid year parameter"))?;
                let month = month
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| TrackerError::validation("Invalid month parameter"))?;
                YearMonth::new(year, month)
                    .map(Some)
                    .ok_or_else(|| TrackerError::validation("Invalid month parameter"))
            }
            (Some(_), None) => Err(TrackerError::validation("Missing month parameter")),
            (None, Some(_)) => Err(TrackerError::validation("Missing year parameter")),
            (None, None) => Ok(None),
        }
    }
}

/// Content hash clients use to skip downloading unchanged months.
fn history_etag(serialized: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(serialized)))
}

fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    value
        .split(',')
        .map(str::trim)
        .any(|v| v == "*" || v == etag || v == etag.trim_matches('"'))
}

async fn history(
    State(state): State<ApiState>,
    Query(query): Query<MonthQuery>,
    headers: HeaderMap,
) -> Result<Response, TrackerError> {
    let month = query.resolve()?;
    let log = state.handle.history(month).await?;
    if log.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let serialized = serialize_events(log.events())?;
    let etag = history_etag(&serialized);
    if etag_matches(&headers, &etag) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    Ok((
        StatusCode::OK,
        [(ETAG, etag)],
        Json(json!({ "history": log.events() })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct ImportBody {
    year: i32,
    month: u32,
    data: Vec<EventEntity>,
}

async fn import_month(State(state): State<ApiState>, body: Bytes) -> Result<Response, TrackerError> {
    let ImportBody { year, month, data } = serde_json::from_slice(&body)
        .map_err(|e| TrackerError::validation(format!("Invalid import: {e}")))?;
    let month = YearMonth::new(year, month)
        .ok_or_else(|| TrackerError::validation("Invalid month parameter"))?;

    let message = match state.handle.import(month, data).await? {
        ImportOutcome::Imported { events } => format!("Imported {events} events into {month}"),
        ImportOutcome::Unchanged => format!("History of {month} is already up to date"),
    };
    Ok((StatusCode::OK, message).into_response())
}

async fn summary(
    State(state): State<ApiState>,
    Query(query): Query<MonthQuery>,
) -> Result<Response, TrackerError> {
    let month = query.resolve()?;
    Ok(Json(state.handle.summary(month).await?).into_response())
}

async fn get_config(State(state): State<ApiState>) -> Result<Response, TrackerError> {
    Ok(Json(state.handle.config().await?).into_response())
}

async fn set_config(State(state): State<ApiState>, body: Bytes) -> Result<StatusCode, TrackerError> {
    let config: UserConfig = serde_json::from_slice(&body)
        .map_err(|e| TrackerError::validation(format!("Invalid config: {e}")))?;
    state.handle.set_config(config).await?;
    Ok(StatusCode::OK)
}
