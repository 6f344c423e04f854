//! `GET /api/health`: liveness plus a database round-trip.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::config;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;

    Ok(Json(HealthResponse {
        status: "ok",
        service: config::APP_NAME,
        version: config::APP_VERSION,
        database: "ok",
    }))
}
