//! Mood check-ins, cognitive game results and the derived wellbeing score.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::api::validation;
use crate::db::{now, repository};
use crate::mental_health::{compute_score, MentalHealthScore, SCORE_GAME_WINDOW, SCORE_MOOD_WINDOW};
use crate::models::{GameKind, GameResult, MoodEntry};

#[derive(Debug, Deserialize)]
pub struct MoodRequest {
    pub mood: i64,
    pub energy: i64,
    pub anxiety: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GameRequest {
    pub game: String,
    /// Whole points; fractional scores are rejected at deserialization.
    pub score: i64,
    pub level: i64,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct MoodQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GameQuery {
    pub game_type: Option<String>,
    pub limit: Option<u32>,
}

/// `POST /api/mental-health/mood`: dated today.
pub async fn add_mood(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<MoodRequest>,
) -> Result<(StatusCode, Json<MoodEntry>), ApiError> {
    let created_at = now();
    let entry = MoodEntry {
        id: Uuid::new_v4(),
        user_id: caller.user_id,
        entry_date: created_at.date(),
        mood: validation::in_range(req.mood, 1, 10, "mood")?,
        energy: validation::in_range(req.energy, 1, 10, "energy")?,
        anxiety: validation::in_range(req.anxiety, 1, 10, "anxiety")?,
        notes: validation::optional_text(req.notes.as_deref(), "Notes", 2000)?,
        created_at,
    };
    let conn = ctx.core.open_db()?;
    repository::insert_mood_entry(&conn, &entry)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `GET /api/mental-health/mood?limit=`
pub async fn list_mood(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<MoodQuery>,
) -> Result<Json<Vec<MoodEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(SCORE_MOOD_WINDOW).clamp(1, 365);
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::recent_mood_entries(&conn, &caller.user_id, limit)?))
}

/// `POST /api/mental-health/games`
pub async fn add_game(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<GameRequest>,
) -> Result<(StatusCode, Json<GameResult>), ApiError> {
    let game = validation::enum_value::<GameKind>(&req.game, "game", GameKind::ALL)?;
    if req.score < 0 {
        return Err(ApiError::bad_request("score cannot be negative"));
    }
    if req.level < 1 {
        return Err(ApiError::bad_request("level must be at least 1"));
    }
    let metrics = match req.metrics {
        None | Some(serde_json::Value::Null) => serde_json::json!({}),
        Some(m @ serde_json::Value::Object(_)) => m,
        Some(_) => return Err(ApiError::bad_request("metrics must be an object")),
    };

    let result = GameResult {
        id: Uuid::new_v4(),
        user_id: caller.user_id,
        game,
        score: req.score as f64,
        level: req.level,
        metrics,
        played_at: now(),
    };
    let conn = ctx.core.open_db()?;
    repository::insert_game_result(&conn, &result)?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// `GET /api/mental-health/games?game_type=&limit=`
pub async fn list_games(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<GameQuery>,
) -> Result<Json<Vec<GameResult>>, ApiError> {
    let game = query
        .game_type
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .map(|g| validation::enum_value::<GameKind>(g, "game type", GameKind::ALL))
        .transpose()?;
    let limit = query.limit.unwrap_or(SCORE_GAME_WINDOW).clamp(1, 500);
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::recent_game_results(
        &conn,
        &caller.user_id,
        game,
        limit,
    )?))
}

/// `GET /api/mental-health/score`
pub async fn score(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<MentalHealthScore>, ApiError> {
    let conn = ctx.core.open_db()?;
    let games = repository::recent_game_results(&conn, &caller.user_id, None, SCORE_GAME_WINDOW)?;
    let moods = repository::recent_mood_entries(&conn, &caller.user_id, SCORE_MOOD_WINDOW)?;
    let score = compute_score(&games, &moods, now());
    tracing::debug!(user_id = %caller.user_id, overall = score.overall, "Wellbeing score computed");
    Ok(Json(score))
}
