use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, now, DatabaseError};
use crate::models::*;

use super::medication::medication_from_row;

pub fn is_in_wishlist(
    conn: &Connection,
    user_id: &Uuid,
    medication_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM wishlist_items WHERE user_id = ?1 AND medication_id = ?2",
        params![user_id.to_string(), medication_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn add_to_wishlist(
    conn: &Connection,
    user_id: &Uuid,
    medication_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO wishlist_items (user_id, medication_id, added_at) VALUES (?1, ?2, ?3)",
        params![
            user_id.to_string(),
            medication_id.to_string(),
            fmt_datetime(&now())
        ],
    )?;
    Ok(())
}

/// Most recently added first.
pub fn list_wishlist(conn: &Connection, user_id: &Uuid) -> Result<Vec<WishlistItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.name, m.category, m.dosage, m.price, m.stock, m.description,
                m.prescription_required, m.expiry_date, m.batch_number, m.supplier, m.image_url,
                m.created_at, m.updated_at, w.added_at
         FROM wishlist_items w JOIN medications m ON m.id = w.medication_id
         WHERE w.user_id = ?1
         ORDER BY w.added_at DESC, m.name",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok(WishlistItem {
            medication: medication_from_row(row)?,
            added_at: get_datetime(row, 14)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn remove_from_wishlist(
    conn: &Connection,
    user_id: &Uuid,
    medication_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM wishlist_items WHERE user_id = ?1 AND medication_id = ?2",
        params![user_id.to_string(), medication_id.to_string()],
    )?;
    Ok(deleted > 0)
}

pub fn clear_wishlist(conn: &Connection, user_id: &Uuid) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM wishlist_items WHERE user_id = ?1",
        params![user_id.to_string()],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_medication, make_user, test_db};

    #[test]
    fn add_list_remove_clear() {
        let conn = test_db();
        let user = make_user(&conn, "shopper@example.com", Role::Patient);
        let a = make_medication(&conn, "Vitamin C", "supplements", 3);
        let b = make_medication(&conn, "Zinc", "supplements", 3);

        add_to_wishlist(&conn, &user.id, &a.id).unwrap();
        add_to_wishlist(&conn, &user.id, &b.id).unwrap();
        assert!(is_in_wishlist(&conn, &user.id, &a.id).unwrap());
        assert_eq!(list_wishlist(&conn, &user.id).unwrap().len(), 2);

        assert!(remove_from_wishlist(&conn, &user.id, &a.id).unwrap());
        assert!(!remove_from_wishlist(&conn, &user.id, &a.id).unwrap());
        assert_eq!(clear_wishlist(&conn, &user.id).unwrap(), 1);
        assert!(list_wishlist(&conn, &user.id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_entry_is_constraint() {
        let conn = test_db();
        let user = make_user(&conn, "shopper@example.com", Role::Patient);
        let med = make_medication(&conn, "Vitamin C", "supplements", 3);
        add_to_wishlist(&conn, &user.id, &med.id).unwrap();
        assert!(add_to_wishlist(&conn, &user.id, &med.id).unwrap_err().is_constraint());
    }
}
