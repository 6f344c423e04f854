use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_enum, get_json, get_opt_datetime, get_uuid, now, DatabaseError};
use crate::models::*;

const PAYMENT_COLUMNS: &str = "id, appointment_id, user_id, amount, payment_method, transaction_id,
     status, reference_number, payment_details, created_at, updated_at";

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: get_uuid(row, 0)?,
        appointment_id: get_uuid(row, 1)?,
        user_id: get_uuid(row, 2)?,
        amount: row.get(3)?,
        payment_method: get_enum(row, 4)?,
        transaction_id: row.get(5)?,
        status: get_enum(row, 6)?,
        reference_number: row.get(7)?,
        payment_details: get_json(row, 8)?,
        created_at: get_datetime(row, 9)?,
        updated_at: get_opt_datetime(row, 10)?,
    })
}

pub fn insert_payment(conn: &Connection, payment: &Payment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO payments (id, appointment_id, user_id, amount, payment_method, transaction_id,
         status, reference_number, payment_details, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            payment.id.to_string(),
            payment.appointment_id.to_string(),
            payment.user_id.to_string(),
            payment.amount,
            payment.payment_method.as_str(),
            payment.transaction_id,
            payment.status.as_str(),
            payment.reference_number,
            serde_json::to_string(&payment.payment_details)?,
            fmt_datetime(&payment.created_at),
            payment.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_payment(conn: &Connection, id: &Uuid) -> Result<Option<Payment>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id.to_string()],
            payment_from_row,
        )
        .optional()?)
}

/// Newest first.
pub fn list_payments_for_user(conn: &Connection, user_id: &Uuid) -> Result<Vec<Payment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![user_id.to_string()], payment_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_payment_status(
    conn: &Connection,
    id: &Uuid,
    status: PaymentStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE payments SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), fmt_datetime(&now())],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Payment", id));
    }
    Ok(())
}
