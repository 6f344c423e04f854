//! Clinic REST API.
//!
//! Routes are nested under `/api/`. Protected routes run behind
//! Rate Limit → Auth → Audit → Handler; public routes behind the rate
//! limiter only. `api_router()` returns a `Router` that can be mounted
//! on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;
pub mod validation;

pub use router::api_router;
pub use server::{start_api_server_on, ApiServer, ServerSession};
pub use types::ApiContext;
