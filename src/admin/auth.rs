use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Expected bearer token.
#[derive(Clone)]
pub struct AdminKey(Arc<str>);

impl AdminKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }
}

pub async fn admin_auth_middleware(
    State(key): State<AdminKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if let Some(token) = auth_header.and_then(|v| v.strip_prefix("Bearer ")) {
        if !key.0.is_empty() && token == &*key.0 {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!(path = %request.uri().path(), "Rejected admin request");
    Err(StatusCode::UNAUTHORIZED)
}
