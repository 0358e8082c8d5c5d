use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::admin::{AdminState, FireOutcome};

#[derive(Debug, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub lifecycle: String,
    pub shutting_down: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let lifecycle = *state.lifecycle.borrow();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        lifecycle: lifecycle.to_string(),
        shutting_down: state.trigger.is_shutting_down(),
    })
}

pub async fn post_shutdown(
    State(state): State<AdminState>,
) -> (StatusCode, Json<ShutdownResponse>) {
    let (code, status) = match state.trigger.fire() {
        FireOutcome::Started => {
            tracing::info!("Shutdown requested through the admin API");
            (StatusCode::ACCEPTED, "shutting_down")
        }
        FireOutcome::AlreadyShuttingDown => (StatusCode::CONFLICT, "already_shutting_down"),
        FireOutcome::NotStarted => (StatusCode::SERVICE_UNAVAILABLE, "trigger_not_started"),
    };
    (
        code,
        Json(ShutdownResponse {
            status: status.to_string(),
        }),
    )
}
