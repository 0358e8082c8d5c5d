//! Response bodies and the lifecycle-owned handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::http::server::{LifecycleState, ReadinessCheck};

/// Body of `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

/// Body of `GET /version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
}

/// State injected into the health handler.
#[derive(Clone)]
pub struct HealthState {
    pub check: ReadinessCheck,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

pub async fn healthz(State(health): State<HealthState>) -> impl IntoResponse {
    let shutting_down = *health.lifecycle.borrow() == LifecycleState::ShuttingDown;
    if shutting_down {
        return (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::new("shutting_down"));
    }

    if (health.check)().await {
        (StatusCode::OK, HealthStatus::new("ok"))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::new("unavailable"))
    }
}

pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
