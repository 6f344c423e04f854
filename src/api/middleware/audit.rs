//! Audit logging middleware.
//!
//! Logs every authenticated request with user id, method, path, status and
//! latency. Runs innermost (after auth has injected `AuthUser`).

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthUser;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let user = req.extensions().get::<AuthUser>().cloned();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match user {
        Some(user) => tracing::info!(
            user_id = %user.user_id,
            role = %user.role,
            %method,
            %path,
            status,
            elapsed_ms,
            "API access"
        ),
        None => tracing::info!(%method, %path, status, elapsed_ms, "API access"),
    }

    response
}
