use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    fmt_date, fmt_datetime, get_datetime, get_enum, get_opt_date, get_opt_datetime, get_uuid,
    now, DatabaseError,
};
use crate::models::*;

const USER_COLUMNS: &str = "id, full_name, email, password_hash, phone, gender, date_of_birth,
     address, profile_picture, role, staff_role_id, is_active, is_verified, last_login,
     created_at, updated_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: get_uuid(row, 0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        phone: row.get(4)?,
        gender: row.get(5)?,
        date_of_birth: get_opt_date(row, 6)?,
        address: row.get(7)?,
        profile_picture: row.get(8)?,
        role: get_enum(row, 9)?,
        staff_role_id: row.get(10)?,
        is_active: row.get(11)?,
        is_verified: row.get(12)?,
        last_login: get_opt_datetime(row, 13)?,
        created_at: get_datetime(row, 14)?,
        updated_at: get_opt_datetime(row, 15)?,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, full_name, email, password_hash, phone, gender, date_of_birth,
         address, profile_picture, role, staff_role_id, is_active, is_verified, last_login,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            user.id.to_string(),
            user.full_name,
            user.email,
            user.password_hash,
            user.phone,
            user.gender,
            user.date_of_birth.as_ref().map(fmt_date),
            user.address,
            user.profile_picture,
            user.role.as_str(),
            user.staff_role_id,
            user.is_active,
            user.is_verified,
            user.last_login.as_ref().map(fmt_datetime),
            fmt_datetime(&user.created_at),
            user.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Emails compare case-insensitively (column is `COLLATE NOCASE`).
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email.trim()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?1",
        params![email.trim()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_users(conn: &Connection, role: Option<Role>) -> Result<Vec<User>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE (?1 IS NULL OR role = ?1)
         ORDER BY created_at DESC, full_name"
    ))?;
    let rows = stmt.query_map(params![role.map(|r| r.as_str())], user_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn count_users_with_role(conn: &Connection, role: Role) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        params![role.as_str()],
        |row| row.get(0),
    )?)
}

/// Persist the self-editable profile fields.
pub fn update_user_profile(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET full_name = ?2, phone = ?3, gender = ?4, date_of_birth = ?5,
         address = ?6, profile_picture = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            user.id.to_string(),
            user.full_name,
            user.phone,
            user.gender,
            user.date_of_birth.as_ref().map(fmt_date),
            user.address,
            user.profile_picture,
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", user.id));
    }
    Ok(())
}

pub fn set_password_hash(conn: &Connection, id: &Uuid, hash: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), hash, fmt_datetime(&now())],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn mark_verified(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET is_verified = 1, updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), fmt_datetime(&now())],
    )?;
    Ok(())
}

pub fn set_user_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), active, fmt_datetime(&now())],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn record_login(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET last_login = ?2 WHERE id = ?1",
        params![id.to_string(), fmt_datetime(&now())],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_user, test_db};

    #[test]
    fn insert_and_fetch_by_id_and_email() {
        let conn = test_db();
        let user = make_user(&conn, "amina@example.com", Role::Patient);

        let by_id = get_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(by_id.email, "amina@example.com");
        assert_eq!(by_id.role, Role::Patient);

        let by_email = get_user_by_email(&conn, "AMINA@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[test]
    fn duplicate_email_is_constraint_violation() {
        let conn = test_db();
        let user = make_user(&conn, "dup@example.com", Role::Patient);
        let mut clone = user.clone();
        clone.id = Uuid::new_v4();
        let err = insert_user(&conn, &clone).unwrap_err();
        assert!(err.is_constraint());
        assert!(email_exists(&conn, "dup@example.com").unwrap());
    }

    #[test]
    fn list_filters_by_role() {
        let conn = test_db();
        make_user(&conn, "p1@example.com", Role::Patient);
        make_user(&conn, "p2@example.com", Role::Patient);
        make_user(&conn, "doc@example.com", Role::Doctor);

        assert_eq!(list_users(&conn, Some(Role::Patient)).unwrap().len(), 2);
        assert_eq!(list_users(&conn, None).unwrap().len(), 3);
        assert_eq!(count_users_with_role(&conn, Role::Doctor).unwrap(), 1);
    }

    #[test]
    fn activation_and_verification_flags() {
        let conn = test_db();
        let user = make_user(&conn, "flags@example.com", Role::Nurse);
        set_user_active(&conn, &user.id, false).unwrap();
        mark_verified(&conn, &user.id).unwrap();
        record_login(&conn, &user.id).unwrap();

        let reloaded = get_user(&conn, &user.id).unwrap().unwrap();
        assert!(!reloaded.is_active);
        assert!(reloaded.is_verified);
        assert!(reloaded.last_login.is_some());
    }

    #[test]
    fn updating_missing_user_is_not_found() {
        let conn = test_db();
        let err = set_user_active(&conn, &Uuid::new_v4(), true).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
