//! Administrative shutdown surface.
//!
//! # Data Flow
//! ```text
//! POST /admin/shutdown (Bearer token)
//!     → auth.rs (token check)
//!     → handlers.rs
//!     → AdminTrigger::fire → ShutdownCoordinator::begin_shutdown (background task)
//! ```

pub mod auth;
pub mod handlers;
pub mod trigger;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::sync::watch;

use crate::http::LifecycleState;
use self::auth::{admin_auth_middleware, AdminKey};
use self::handlers::{get_status, post_shutdown};

pub use trigger::{AdminTrigger, FireOutcome};

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub trigger: Arc<AdminTrigger>,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

/// Routes under `/admin`, guarded by the bearer token `api_key`.
pub fn setup_admin_router(
    trigger: Arc<AdminTrigger>,
    lifecycle: watch::Receiver<LifecycleState>,
    api_key: &str,
) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/shutdown", post(post_shutdown))
        .layer(middleware::from_fn_with_state(
            AdminKey::new(api_key),
            admin_auth_middleware,
        ))
        .with_state(AdminState { trigger, lifecycle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ShutdownCoordinator;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn admin_router(trigger: Arc<AdminTrigger>) -> Router {
        let (_tx, lifecycle) = watch::channel(LifecycleState::Ready);
        setup_admin_router(trigger, lifecycle, "secret")
    }

    async fn post(router: Router, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method("POST").uri("/admin/shutdown");
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let router = admin_router(Arc::new(AdminTrigger::new()));
        let (status, _) = post(router.clone(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = post(router, Some("guess")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unstarted_trigger_is_unavailable() {
        let router = admin_router(Arc::new(AdminTrigger::new()));
        let (status, body) = post(router, Some("secret")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "trigger_not_started");
    }

    #[tokio::test]
    async fn second_request_conflicts() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let trigger = Arc::new(AdminTrigger::new());
        coordinator.register_trigger(trigger.clone()).unwrap();
        coordinator.start_all().unwrap();
        coordinator.begin_shutdown(trigger.as_ref()).await.unwrap();

        let router = admin_router(trigger);
        let (status, body) = post(router, Some("secret")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "already_shutting_down");
    }
}
