use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_uuid, DatabaseError};
use crate::models::*;

pub fn insert_activity(conn: &Connection, entry: &ActivityLog) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO activity_logs (id, user_id, action, device, location, ip_address, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id.to_string(),
            entry.user_id.to_string(),
            entry.action,
            entry.device,
            entry.location,
            entry.ip_address,
            fmt_datetime(&entry.created_at),
        ],
    )?;
    Ok(())
}

/// Most recent first.
pub fn list_activity(
    conn: &Connection,
    user_id: &Uuid,
    limit: u32,
) -> Result<Vec<ActivityLog>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, action, device, location, ip_address, created_at
         FROM activity_logs WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id.to_string(), limit], |row| {
        Ok(ActivityLog {
            id: get_uuid(row, 0)?,
            user_id: get_uuid(row, 1)?,
            action: row.get(2)?,
            device: row.get(3)?,
            location: row.get(4)?,
            ip_address: row.get(5)?,
            created_at: get_datetime(row, 6)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
