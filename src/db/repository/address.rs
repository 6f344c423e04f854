use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_opt_datetime, get_uuid, now, DatabaseError};
use crate::models::*;

const ADDRESS_COLUMNS: &str = "id, user_id, first_name, last_name, phone_number, address,
     additional_info, region, city, is_default, created_at, updated_at";

fn address_from_row(row: &Row) -> rusqlite::Result<Address> {
    Ok(Address {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone_number: row.get(4)?,
        address: row.get(5)?,
        additional_info: row.get(6)?,
        region: row.get(7)?,
        city: row.get(8)?,
        is_default: row.get(9)?,
        created_at: get_datetime(row, 10)?,
        updated_at: get_opt_datetime(row, 11)?,
    })
}

fn clear_default(conn: &Connection, user_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE addresses SET is_default = 0 WHERE user_id = ?1 AND is_default = 1",
        params![user_id.to_string()],
    )?;
    Ok(())
}

/// The user's first address becomes the default regardless of the flag.
pub fn insert_address(conn: &Connection, address: &Address) -> Result<Address, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let existing: i64 = tx.query_row(
        "SELECT COUNT(*) FROM addresses WHERE user_id = ?1",
        params![address.user_id.to_string()],
        |row| row.get(0),
    )?;
    let mut stored = address.clone();
    stored.is_default = address.is_default || existing == 0;
    if stored.is_default {
        clear_default(&tx, &address.user_id)?;
    }
    tx.execute(
        "INSERT INTO addresses (id, user_id, first_name, last_name, phone_number, address,
         additional_info, region, city, is_default, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            stored.id.to_string(),
            stored.user_id.to_string(),
            stored.first_name,
            stored.last_name,
            stored.phone_number,
            stored.address,
            stored.additional_info,
            stored.region,
            stored.city,
            stored.is_default,
            fmt_datetime(&stored.created_at),
            stored.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    tx.commit()?;
    Ok(stored)
}

pub fn get_address(conn: &Connection, id: &Uuid) -> Result<Option<Address>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = ?1"),
            params![id.to_string()],
            address_from_row,
        )
        .optional()?)
}

/// Default address first.
pub fn list_addresses(conn: &Connection, user_id: &Uuid) -> Result<Vec<Address>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = ?1
         ORDER BY is_default DESC, created_at DESC"
    ))?;
    let rows = stmt.query_map(params![user_id.to_string()], address_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_address(conn: &Connection, address: &Address) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    if address.is_default {
        clear_default(&tx, &address.user_id)?;
    }
    let changed = tx.execute(
        "UPDATE addresses SET first_name = ?2, last_name = ?3, phone_number = ?4, address = ?5,
         additional_info = ?6, region = ?7, city = ?8, is_default = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            address.id.to_string(),
            address.first_name,
            address.last_name,
            address.phone_number,
            address.address,
            address.additional_info,
            address.region,
            address.city,
            address.is_default,
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Address", address.id));
    }
    tx.commit()?;
    Ok(())
}

pub fn set_default_address(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    clear_default(&tx, user_id)?;
    let changed = tx.execute(
        "UPDATE addresses SET is_default = 1, updated_at = ?3 WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string(), fmt_datetime(&now())],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Address", id));
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_address(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM addresses WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}
