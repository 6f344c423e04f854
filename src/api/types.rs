//! Shared types for the API layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::authorization::Actor;
use crate::core_state::CoreState;
use crate::models::Role;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Authenticated user, injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Caller identity, injected into request extensions by the auth
/// middleware after the access token and the user row both check out.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            role: self.role,
        }
    }

    /// 403 unless the caller holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Access denied. Required roles: {}",
                roles
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require(&[Role::SuperAdmin, Role::ClinicianAdmin])
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Staff access required"))
        }
    }
}

/// Parse a path id, 400 on garbage.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid {what} ID")))
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `?limit=` with a per-endpoint default and ceiling.
#[derive(Debug, Deserialize, Default)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

impl LimitQuery {
    pub fn resolve(&self, default: u32, max: u32) -> u32 {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: sliding window per caller
// ═══════════════════════════════════════════════════════════

/// Per-caller sliding-window rate limiter.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
    per_hour: u32,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
            per_minute: 100,
            per_hour: 1000,
        }
    }

    /// Check if a caller is within rate limits. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let entries = self.windows.entry(key.to_string()).or_default();

        entries.retain(|ts| now.duration_since(*ts) < Duration::from_secs(3600));

        let last_minute = entries
            .iter()
            .filter(|ts| now.duration_since(**ts) < Duration::from_secs(60))
            .count() as u32;
        if last_minute >= self.per_minute {
            return Err(60);
        }

        if entries.len() as u32 >= self.per_hour {
            return Err(3600);
        }

        entries.push(now);
        Ok(())
    }

    /// Drop callers with no requests in the last hour.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.windows.retain(|_, entries| {
            entries
                .last()
                .is_some_and(|ts| now.duration_since(*ts) < Duration::from_secs(3600))
        });
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "u@kiangombe.test".into(),
            role,
        }
    }

    #[test]
    fn rate_limiter_allows_under_limit() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.check("caller-1").is_ok());
        assert!(limiter.check("caller-1").is_ok());
    }

    #[test]
    fn rate_limiter_rejects_over_per_minute() {
        let mut limiter = RateLimiter {
            windows: HashMap::new(),
            per_minute: 2,
            per_hour: 1000,
        };
        assert!(limiter.check("caller-1").is_ok());
        assert!(limiter.check("caller-1").is_ok());
        assert_eq!(limiter.check("caller-1"), Err(60));
    }

    #[test]
    fn rate_limiter_rejects_over_per_hour() {
        let mut limiter = RateLimiter {
            windows: HashMap::new(),
            per_minute: 100,
            per_hour: 3,
        };
        for _ in 0..3 {
            assert!(limiter.check("caller-1").is_ok());
        }
        assert_eq!(limiter.check("caller-1"), Err(3600));
    }

    #[test]
    fn rate_limiter_isolates_callers() {
        let mut limiter = RateLimiter {
            windows: HashMap::new(),
            per_minute: 1,
            per_hour: 1000,
        };
        assert!(limiter.check("caller-1").is_ok());
        assert!(limiter.check("caller-2").is_ok());
        assert!(limiter.check("caller-1").is_err());
    }

    #[test]
    fn prune_keeps_recent_callers() {
        let mut limiter = RateLimiter::new();
        limiter.check("caller-1").unwrap();
        limiter.prune();
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn role_guards() {
        assert!(user(Role::SuperAdmin).require_admin().is_ok());
        assert!(matches!(
            user(Role::Doctor).require_admin(),
            Err(ApiError::Forbidden(_))
        ));
        assert!(user(Role::Pharmacist).require_staff().is_ok());
        assert!(user(Role::Patient).require_staff().is_err());
        assert!(user(Role::Nurse).require(&[Role::Nurse, Role::Doctor]).is_ok());
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid", "appointment").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "appointment").unwrap(), id);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(LimitQuery { limit: None }.resolve(30, 100), 30);
        assert_eq!(LimitQuery { limit: Some(0) }.resolve(30, 100), 1);
        assert_eq!(LimitQuery { limit: Some(500) }.resolve(30, 100), 100);
    }
}
