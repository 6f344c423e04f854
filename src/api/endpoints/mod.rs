pub mod appointments;
pub mod auth;
pub mod chat;
pub mod consultations;
pub mod dashboard;
pub mod doctor_profile;
pub mod doctors;
pub mod health;
pub mod medications;
pub mod mental_health;
pub mod patient_profile;
pub mod payments;
pub mod prescriptions;
pub mod staff;
pub mod users;

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{now, repository};
use crate::models::ActivityLog;

/// Where a request came from, for the user's activity log.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub device: Option<String>,
    pub ip_address: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let device = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(255).collect());
        let ip_address = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(Self { device, ip_address })
    }
}

/// Append to the caller's activity log. A failed write is logged, not surfaced.
pub(crate) fn log_activity(conn: &Connection, user_id: Uuid, action: &str, client: &ClientInfo) {
    let entry = ActivityLog {
        id: Uuid::new_v4(),
        user_id,
        action: action.to_string(),
        device: client.device.clone(),
        location: None,
        ip_address: client.ip_address.clone(),
        created_at: now(),
    };
    if let Err(e) = repository::insert_activity(conn, &entry) {
        tracing::warn!(%user_id, action, error = %e, "Failed to record activity");
    }
}

/// Router harness shared by the endpoint tests.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use rusqlite::Connection;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::api::router::api_router;
    use crate::config::AppConfig;
    use crate::core_state::CoreState;
    use crate::crypto::TokenKind;
    use crate::db::repository;
    use crate::mailer::OutboxMailer;
    use crate::models::{Role, User};

    pub const PASSWORD: &str = "correct-horse-battery";

    pub struct TestApp {
        pub core: Arc<CoreState>,
        pub outbox: Arc<OutboxMailer>,
        router: Router,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = AppConfig::for_tests(dir.path().join("clinic.db"));
            let outbox = Arc::new(OutboxMailer::new());
            let core = Arc::new(CoreState::open_with_mailer(config, outbox.clone()).unwrap());
            let router = api_router(core.clone());
            Self {
                core,
                outbox,
                router,
                _dir: dir,
            }
        }

        pub fn conn(&self) -> Connection {
            self.core.open_db().unwrap()
        }

        /// Verified, active account with `PASSWORD`, plus an access token.
        pub fn user(&self, email: &str, role: Role) -> (User, String) {
            let conn = self.conn();
            let mut user = repository::fixtures::make_user(&conn, email, role);
            user.password_hash = self.core.passwords().hash(PASSWORD).unwrap();
            repository::set_password_hash(&conn, &user.id, &user.password_hash).unwrap();
            let token = self.core.issue_token(&user, TokenKind::Access).unwrap();
            (user, token)
        }

        pub fn token_for(&self, user: &User) -> String {
            self.core.issue_token(user, TokenKind::Access).unwrap()
        }

        pub async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> Response {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("Authorization", format!("Bearer {token}"));
            }
            let request = match body {
                Some(json) => builder
                    .header("Content-Type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.router.clone().oneshot(request).await.unwrap()
        }

        pub async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let response = self.send(method, uri, token, body).await;
            let status = response.status();
            let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }

        pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            self.call(Method::GET, uri, token, None).await
        }

        pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.call(Method::POST, uri, token, Some(body)).await
        }

        pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.call(Method::PUT, uri, token, Some(body)).await
        }

        pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            self.call(Method::DELETE, uri, token, None).await
        }
    }

    /// Six-digit code from the last mail sent to `to`.
    pub fn mailed_code(app: &TestApp, to: &str) -> String {
        let body = app.outbox.last_to(to).unwrap().body;
        let start = body.find("code: ").unwrap() + "code: ".len();
        body[start..start + 6].to_string()
    }

    /// Token query parameter from the last mail sent to `to`.
    pub fn mailed_token(app: &TestApp, to: &str) -> String {
        let body = app.outbox.last_to(to).unwrap().body;
        let start = body.find("token=").unwrap() + "token=".len();
        body[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .to_string()
    }
}
