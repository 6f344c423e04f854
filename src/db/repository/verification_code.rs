//! One-time codes for the code-based email verification and password
//! reset flows. Only a hash of each code is stored.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_enum, get_uuid, now, DatabaseError};
use crate::models::*;

/// Replaces any outstanding code for the same user and purpose.
pub fn replace_verification_code(conn: &Connection, code: &VerificationCode) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE verification_codes SET consumed = 1
         WHERE user_id = ?1 AND purpose = ?2 AND consumed = 0",
        params![code.user_id.to_string(), code.purpose.as_str()],
    )?;
    tx.execute(
        "INSERT INTO verification_codes (id, user_id, purpose, code_hash, expires_at, attempts,
         consumed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            code.id.to_string(),
            code.user_id.to_string(),
            code.purpose.as_str(),
            code.code_hash,
            fmt_datetime(&code.expires_at),
            code.attempts,
            code.consumed,
            fmt_datetime(&code.created_at),
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// Latest unconsumed, unexpired code.
pub fn active_verification_code(
    conn: &Connection,
    user_id: &Uuid,
    purpose: CodePurpose,
) -> Result<Option<VerificationCode>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, purpose, code_hash, expires_at, attempts, consumed, created_at
             FROM verification_codes
             WHERE user_id = ?1 AND purpose = ?2 AND consumed = 0 AND expires_at > ?3
             ORDER BY created_at DESC LIMIT 1",
            params![user_id.to_string(), purpose.as_str(), fmt_datetime(&now())],
            |row| {
                Ok(VerificationCode {
                    id: get_uuid(row, 0)?,
                    user_id: get_uuid(row, 1)?,
                    purpose: get_enum(row, 2)?,
                    code_hash: row.get(3)?,
                    expires_at: get_datetime(row, 4)?,
                    attempts: row.get(5)?,
                    consumed: row.get(6)?,
                    created_at: get_datetime(row, 7)?,
                })
            },
        )
        .optional()?)
}

/// Returns the new attempt count.
pub fn record_failed_attempt(conn: &Connection, id: &Uuid) -> Result<i64, DatabaseError> {
    conn.execute(
        "UPDATE verification_codes SET attempts = attempts + 1 WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(conn.query_row(
        "SELECT attempts FROM verification_codes WHERE id = ?1",
        params![id.to_string()],
        |row| row.get(0),
    )?)
}

pub fn consume_verification_code(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE verification_codes SET consumed = 1 WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_user, test_db};
    use chrono::Duration;

    fn code(user_id: Uuid, hash: &str, ttl_minutes: i64) -> VerificationCode {
        VerificationCode {
            id: Uuid::new_v4(),
            user_id,
            purpose: CodePurpose::PasswordReset,
            code_hash: hash.into(),
            expires_at: now() + Duration::minutes(ttl_minutes),
            attempts: 0,
            consumed: false,
            created_at: now(),
        }
    }

    #[test]
    fn newer_code_supersedes_older() {
        let conn = test_db();
        let user = make_user(&conn, "pat@example.com", Role::Patient);
        replace_verification_code(&conn, &code(user.id, "first", 15)).unwrap();
        replace_verification_code(&conn, &code(user.id, "second", 15)).unwrap();

        let active = active_verification_code(&conn, &user.id, CodePurpose::PasswordReset)
            .unwrap()
            .unwrap();
        assert_eq!(active.code_hash, "second");
        assert!(active_verification_code(&conn, &user.id, CodePurpose::EmailVerification)
            .unwrap()
            .is_none());
    }

    #[test]
    fn expired_and_consumed_codes_are_inactive() {
        let conn = test_db();
        let user = make_user(&conn, "pat@example.com", Role::Patient);
        replace_verification_code(&conn, &code(user.id, "stale", -1)).unwrap();
        assert!(active_verification_code(&conn, &user.id, CodePurpose::PasswordReset)
            .unwrap()
            .is_none());

        let fresh = code(user.id, "fresh", 15);
        replace_verification_code(&conn, &fresh).unwrap();
        assert_eq!(record_failed_attempt(&conn, &fresh.id).unwrap(), 1);
        consume_verification_code(&conn, &fresh.id).unwrap();
        assert!(active_verification_code(&conn, &user.id, CodePurpose::PasswordReset)
            .unwrap()
            .is_none());
    }
}
