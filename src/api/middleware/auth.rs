//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies it as an access token,
//! re-reads the user row (deactivation takes effect immediately), and
//! injects `AuthUser` into request extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::crypto::TokenKind;
use crate::db::repository;

/// Pull the raw token out of an `Authorization` header.
pub fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid access token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `AuthUser` and adds `Cache-Control: no-store`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    let claims = ctx.core.tokens().verify(token, TokenKind::Access)?;

    let user = {
        let conn = ctx.core.open_db()?;
        repository::get_user(&conn, &claims.sub)?.ok_or(ApiError::Unauthorized)?
    }; // connection dropped here, before any .await

    if !user.is_active {
        return Err(ApiError::forbidden("Inactive user"));
    }

    req.extensions_mut().insert(AuthUser {
        user_id: user.id,
        email: user.email,
        role: user.role,
    });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}
