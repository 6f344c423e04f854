use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::GameKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entry_date: NaiveDate,
    pub mood: i64,
    pub energy: i64,
    pub anxiety: i64,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub game: GameKind,
    pub score: f64,
    pub level: i64,
    pub metrics: serde_json::Value,
    pub played_at: NaiveDateTime,
}
