//! Business routes mounted on the server.
//!
//! The lifecycle treats this router as opaque; it only adds its own
//! `/healthz` and `/version` next to it.

pub mod user;

use axum::{routing::get, Router};

/// Versioned controller routes.
pub fn router() -> Router {
    let v1 = Router::new().route("/hello", get(user::hello_v1));
    let v2 = Router::new().route("/hello", get(user::hello_v2));

    Router::new().nest("/v1", v1).nest("/v2", v2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    async fn get_user(path: &str) -> user::User {
        let response = router()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn versioned_hello_routes() {
        let v1 = get_user("/v1/hello").await;
        assert_eq!(v1.nickname, "a1");
        assert_eq!(v1.email, "a1@email.com");

        let v2 = get_user("/v2/hello").await;
        assert_eq!(v2.nickname, "a2");
        assert_eq!(v2.phone, "13511235123");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = router()
            .oneshot(Request::builder().uri("/v3/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
