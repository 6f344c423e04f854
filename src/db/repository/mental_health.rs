use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{fmt_date, fmt_datetime, get_date, get_datetime, get_enum, get_json, get_uuid, DatabaseError};
use crate::models::*;

pub fn insert_mood_entry(conn: &Connection, entry: &MoodEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO mood_entries (id, user_id, entry_date, mood, energy, anxiety, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id.to_string(),
            entry.user_id.to_string(),
            fmt_date(&entry.entry_date),
            entry.mood,
            entry.energy,
            entry.anxiety,
            entry.notes,
            fmt_datetime(&entry.created_at),
        ],
    )?;
    Ok(())
}

/// Newest `entry_date` first.
pub fn recent_mood_entries(
    conn: &Connection,
    user_id: &Uuid,
    limit: u32,
) -> Result<Vec<MoodEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, entry_date, mood, energy, anxiety, notes, created_at
         FROM mood_entries WHERE user_id = ?1
         ORDER BY entry_date DESC, created_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id.to_string(), limit], |row| {
        Ok(MoodEntry {
            id: get_uuid(row, 0)?,
            user_id: get_uuid(row, 1)?,
            entry_date: get_date(row, 2)?,
            mood: row.get(3)?,
            energy: row.get(4)?,
            anxiety: row.get(5)?,
            notes: row.get(6)?,
            created_at: get_datetime(row, 7)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn insert_game_result(conn: &Connection, result: &GameResult) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO game_results (id, user_id, game, score, level, metrics, played_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            result.id.to_string(),
            result.user_id.to_string(),
            result.game.as_str(),
            result.score,
            result.level,
            serde_json::to_string(&result.metrics)?,
            fmt_datetime(&result.played_at),
        ],
    )?;
    Ok(())
}

/// Newest first, optionally restricted to one game.
pub fn recent_game_results(
    conn: &Connection,
    user_id: &Uuid,
    game: Option<GameKind>,
    limit: u32,
) -> Result<Vec<GameResult>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, game, score, level, metrics, played_at
         FROM game_results WHERE user_id = ?1 AND (?2 IS NULL OR game = ?2)
         ORDER BY played_at DESC, rowid DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        params![user_id.to_string(), game.map(|g| g.as_str()), limit],
        |row| {
            Ok(GameResult {
                id: get_uuid(row, 0)?,
                user_id: get_uuid(row, 1)?,
                game: get_enum(row, 2)?,
                score: row.get(3)?,
                level: row.get(4)?,
                metrics: get_json(row, 5)?,
                played_at: get_datetime(row, 6)?,
            })
        },
    )?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
