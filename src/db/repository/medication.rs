use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    fmt_date, fmt_datetime, get_datetime, get_opt_date, get_opt_datetime, get_uuid, now,
    DatabaseError,
};
use crate::models::*;

const MEDICATION_COLUMNS: &str = "m.id, m.name, m.category, m.dosage, m.price, m.stock,
     m.description, m.prescription_required, m.expiry_date, m.batch_number, m.supplier,
     m.image_url, m.created_at, m.updated_at";

pub(crate) fn medication_from_row(row: &Row) -> rusqlite::Result<Medication> {
    let stock: i64 = row.get(5)?;
    Ok(Medication {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        dosage: row.get(3)?,
        price: row.get(4)?,
        stock,
        description: row.get(6)?,
        prescription_required: row.get(7)?,
        expiry_date: get_opt_date(row, 8)?,
        batch_number: row.get(9)?,
        supplier: row.get(10)?,
        image_url: row.get(11)?,
        in_stock: stock > 0,
        created_at: get_datetime(row, 12)?,
        updated_at: get_opt_datetime(row, 13)?,
    })
}

#[derive(Debug, Default, Clone)]
pub struct MedicationFilter {
    pub category: Option<String>,
    /// Case-insensitive match on name or description.
    pub search: Option<String>,
    pub in_stock: Option<bool>,
}

pub fn insert_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medications (id, name, category, dosage, price, stock, description,
         prescription_required, expiry_date, batch_number, supplier, image_url, created_at,
         updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            med.id.to_string(),
            med.name,
            med.category,
            med.dosage,
            med.price,
            med.stock,
            med.description,
            med.prescription_required,
            med.expiry_date.as_ref().map(fmt_date),
            med.batch_number,
            med.supplier,
            med.image_url,
            fmt_datetime(&med.created_at),
            med.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_medication(conn: &Connection, id: &Uuid) -> Result<Option<Medication>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications m WHERE m.id = ?1"),
            params![id.to_string()],
            medication_from_row,
        )
        .optional()?)
}

pub fn list_medications(
    conn: &Connection,
    filter: &MedicationFilter,
) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications m
         WHERE (?1 IS NULL OR m.category = ?1 COLLATE NOCASE)
           AND (?2 IS NULL OR m.name LIKE '%' || ?2 || '%'
                OR m.description LIKE '%' || ?2 || '%')
           AND (?3 IS NULL OR (m.stock > 0) = ?3)
         ORDER BY m.name"
    ))?;
    let rows = stmt.query_map(
        params![filter.category, filter.search, filter.in_stock],
        medication_from_row,
    )?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET name = ?2, category = ?3, dosage = ?4, price = ?5, stock = ?6,
         description = ?7, prescription_required = ?8, expiry_date = ?9, batch_number = ?10,
         supplier = ?11, image_url = ?12, updated_at = ?13
         WHERE id = ?1",
        params![
            med.id.to_string(),
            med.name,
            med.category,
            med.dosage,
            med.price,
            med.stock,
            med.description,
            med.prescription_required,
            med.expiry_date.as_ref().map(fmt_date),
            med.batch_number,
            med.supplier,
            med.image_url,
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Medication", med.id));
    }
    Ok(())
}

/// Returns false when no such medication existed.
pub fn delete_medication(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM medications WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_medication, test_db};

    #[test]
    fn in_stock_derived_from_stock() {
        let conn = test_db();
        let med = make_medication(&conn, "Amoxicillin", "antibiotics", 0);
        let loaded = get_medication(&conn, &med.id).unwrap().unwrap();
        assert!(!loaded.in_stock);

        let mut restocked = loaded.clone();
        restocked.stock = 12;
        update_medication(&conn, &restocked).unwrap();
        assert!(get_medication(&conn, &med.id).unwrap().unwrap().in_stock);
    }

    #[test]
    fn filters_category_search_and_stock() {
        let conn = test_db();
        make_medication(&conn, "Amoxicillin", "antibiotics", 5);
        make_medication(&conn, "Paracetamol", "pain", 0);
        make_medication(&conn, "Ibuprofen", "pain", 10);

        let pain = list_medications(
            &conn,
            &MedicationFilter {
                category: Some("PAIN".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(pain.len(), 2);

        let stocked_pain = list_medications(
            &conn,
            &MedicationFilter {
                category: Some("pain".into()),
                in_stock: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(stocked_pain.len(), 1);
        assert_eq!(stocked_pain[0].name, "Ibuprofen");

        let search = list_medications(
            &conn,
            &MedicationFilter {
                search: Some("amox".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(search.len(), 1);
    }

    #[test]
    fn price_must_be_positive() {
        let conn = test_db();
        let mut med = make_medication(&conn, "Zinc", "supplements", 1);
        med.id = Uuid::new_v4();
        med.price = 0.0;
        assert!(insert_medication(&conn, &med).unwrap_err().is_constraint());
    }

    #[test]
    fn delete_reports_absence() {
        let conn = test_db();
        let med = make_medication(&conn, "Zinc", "supplements", 1);
        assert!(delete_medication(&conn, &med.id).unwrap());
        assert!(!delete_medication(&conn, &med.id).unwrap());
    }
}
