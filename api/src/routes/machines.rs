//! Machine REST surface: registration, presence, timeline, commands and
//! settings pushes. All write paths go through the event router so the
//! WebSocket feeds stay in sync with REST-initiated changes.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{Local, Offset, Utc};
use serde::{Deserialize, Serialize};

use db::models::machine;
use db::settings::SettingsPatch;
use db::store::MachineRegistration;

use crate::activity::build_timeline;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::ws::router::RouterError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/register", post(register))
        .route("/{id}/status", get(status))
        .route("/{id}/timeline", get(timeline))
        .route("/{id}/command", post(command))
        .route("/{id}/settings", post(push_settings))
}

fn router_error(e: RouterError) -> Response {
    let (code, message) = match &e {
        RouterError::UnknownMachine(id) => (StatusCode::NOT_FOUND, format!("machine {id} not found")),
        RouterError::ArchivedMachine(id) => {
            (StatusCode::CONFLICT, format!("machine {id} is archived"))
        }
        RouterError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid credentials".into()),
        RouterError::Db(err) => {
            tracing::error!("database error: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
        }
    };
    (code, axum::Json(ApiResponse::error(message))).into_response()
}

/* ---------- registration ---------- */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// `api_key` is only disclosed here; the machine model never serializes it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub machine: machine::Model,
    pub api_key: String,
    pub created: bool,
}

async fn register(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<RegisterRequest>,
) -> Response {
    let reg = MachineRegistration {
        id: None,
        name: req.name,
        display_name: req.display_name,
        hostname: req.hostname,
        ip_address: req.ip_address,
        api_key: uuid::Uuid::new_v4().to_string(),
    };
    match state.router().register(reg).await {
        Ok((machine, created)) => {
            let api_key = machine.api_key.clone();
            let code = if created { StatusCode::CREATED } else { StatusCode::OK };
            let message = if created {
                "Machine registered"
            } else {
                "Machine already registered"
            };
            (
                code,
                axum::Json(ApiResponse::success(
                    RegisterResponse {
                        machine,
                        api_key,
                        created,
                    },
                    message,
                )),
            )
                .into_response()
        }
        Err(e) => router_error(e),
    }
}

/* ---------- presence ---------- */

async fn list(State(state): State<AppState>) -> Response {
    match state.router().snapshot().await {
        Ok(machines) => {
            axum::Json(ApiResponse::success(machines, "Machines retrieved")).into_response()
        }
        Err(e) => router_error(RouterError::Db(e)),
    }
}

async fn status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.router().status(&id).await {
        Ok(summary) => {
            axum::Json(ApiResponse::success(summary, "Status retrieved")).into_response()
        }
        Err(e) => router_error(e),
    }
}

/* ---------- timeline ---------- */

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default = "default_hours")]
    pub hours: u32,
}

fn default_hours() -> u32 {
    24
}

async fn timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<TimelineQuery>,
) -> Response {
    match state.store().machine_by_id(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return router_error(RouterError::UnknownMachine(id)),
        Err(e) => return router_error(RouterError::Db(e)),
    }

    let now_ts = Utc::now().timestamp();
    let from_ts = now_ts - i64::from(q.hours) * 3600;
    let sessions = match state.store().sessions_since(&id, from_ts).await {
        Ok(sessions) => sessions,
        Err(e) => return router_error(RouterError::Db(e)),
    };
    let tz_offset = Local::now().offset().fix().local_minus_utc();
    let timeline = build_timeline(&sessions, q.hours, tz_offset, now_ts);
    axum::Json(ApiResponse::success(timeline, "Timeline built")).into_response()
}

/* ---------- commands & settings ---------- */

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Shutdown,
    Restart,
    Logoff,
    Lock,
    Screenshot,
}

impl CommandType {
    fn as_str(self) -> &'static str {
        match self {
            CommandType::Shutdown => "shutdown",
            CommandType::Restart => "restart",
            CommandType::Logoff => "logoff",
            CommandType::Lock => "lock",
            CommandType::Screenshot => "screenshot",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: CommandType,
}

async fn command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(req): axum::Json<CommandRequest>,
) -> Response {
    match state.router().send_command(&id, req.command.as_str()).await {
        Ok(()) => axum::Json(ApiResponse::success((), "Command dispatched")).into_response(),
        Err(e) => router_error(e),
    }
}

async fn push_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(patch): axum::Json<SettingsPatch>,
) -> Response {
    match state.router().push_settings(&id, &patch).await {
        Ok(merged) => axum::Json(ApiResponse::success(merged, "Settings pushed")).into_response(),
        Err(e) => router_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_match_the_wire_values() {
        let parsed: CommandType = serde_json::from_str("\"shutdown\"").unwrap();
        assert_eq!(parsed.as_str(), "shutdown");
        assert!(serde_json::from_str::<CommandType>("\"format\"").is_err());
    }

    #[test]
    fn timeline_query_defaults_to_a_day() {
        let q: TimelineQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.hours, 24);
    }
}
