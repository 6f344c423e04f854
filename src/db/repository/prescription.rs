use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    fmt_date, fmt_datetime, get_datetime, get_enum, get_json, get_opt_date, get_opt_datetime,
    get_uuid, now, DatabaseError,
};
use crate::models::*;

const PRESCRIPTION_COLUMNS: &str = "p.id, p.appointment_id, p.issued_by_doctor_id, p.pharmacy_name,
     p.medications_json, p.status, p.issued_date, p.expiry_date, p.verified, p.created_at,
     p.updated_at";

fn prescription_from_row(row: &Row) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: get_uuid(row, 0)?,
        appointment_id: get_uuid(row, 1)?,
        issued_by_doctor_id: get_uuid(row, 2)?,
        pharmacy_name: row.get(3)?,
        medications: get_json(row, 4)?,
        status: get_enum(row, 5)?,
        issued_date: get_datetime(row, 6)?,
        expiry_date: get_opt_date(row, 7)?,
        verified: row.get(8)?,
        created_at: get_datetime(row, 9)?,
        updated_at: get_opt_datetime(row, 10)?,
    })
}

/// Scope through the owning appointment; `None` fields match everything.
#[derive(Debug, Default, Clone)]
pub struct PrescriptionFilter {
    pub patient_id: Option<Uuid>,
    pub clinician_id: Option<Uuid>,
    pub status: Option<PrescriptionStatus>,
}

/// Fails with `ConstraintViolation` when the appointment already has one.
pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    let result = conn.execute(
        "INSERT INTO prescriptions (id, appointment_id, issued_by_doctor_id, pharmacy_name,
         medications_json, status, issued_date, expiry_date, verified, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            rx.id.to_string(),
            rx.appointment_id.to_string(),
            rx.issued_by_doctor_id.to_string(),
            rx.pharmacy_name,
            serde_json::to_string(&rx.medications)?,
            rx.status.as_str(),
            fmt_datetime(&rx.issued_date),
            rx.expiry_date.as_ref().map(fmt_date),
            rx.verified,
            fmt_datetime(&rx.created_at),
            rx.updated_at.as_ref().map(fmt_datetime),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            let err = DatabaseError::from(e);
            if err.is_constraint() && get_prescription_by_appointment(conn, &rx.appointment_id)?.is_some() {
                return Err(DatabaseError::ConstraintViolation(
                    "Prescription already exists for this appointment".into(),
                ));
            }
            Err(err)
        }
    }
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p WHERE p.id = ?1"),
            params![id.to_string()],
            prescription_from_row,
        )
        .optional()?)
}

pub fn get_prescription_by_appointment(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<Prescription>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p WHERE p.appointment_id = ?1"
            ),
            params![appointment_id.to_string()],
            prescription_from_row,
        )
        .optional()?)
}

/// Newest first.
pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRESCRIPTION_COLUMNS}
         FROM prescriptions p JOIN appointments a ON a.id = p.appointment_id
         WHERE (?1 IS NULL OR a.patient_id = ?1)
           AND (?2 IS NULL OR a.clinician_id = ?2)
           AND (?3 IS NULL OR p.status = ?3)
         ORDER BY p.created_at DESC"
    ))?;
    let rows = stmt.query_map(
        params![
            filter.patient_id.map(|id| id.to_string()),
            filter.clinician_id.map(|id| id.to_string()),
            filter.status.map(|s| s.as_str()),
        ],
        prescription_from_row,
    )?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET pharmacy_name = ?2, medications_json = ?3, status = ?4,
         expiry_date = ?5, verified = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            rx.id.to_string(),
            rx.pharmacy_name,
            serde_json::to_string(&rx.medications)?,
            rx.status.as_str(),
            rx.expiry_date.as_ref().map(fmt_date),
            rx.verified,
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Prescription", rx.id));
    }
    Ok(())
}

pub fn count_prescriptions(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM prescriptions", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{
        make_appointment, make_doctor, make_prescription, make_user, test_db,
    };

    #[test]
    fn one_prescription_per_appointment() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let appt = make_appointment(&conn, patient.id, doc.id);
        let first = make_prescription(&conn, appt.id, doc.id);

        let mut second = first.clone();
        second.id = Uuid::new_v4();
        let err = insert_prescription(&conn, &second).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn medications_survive_json_column() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let appt = make_appointment(&conn, patient.id, doc.id);
        let rx = make_prescription(&conn, appt.id, doc.id);

        let loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        assert_eq!(loaded.medications, rx.medications);
        assert_eq!(loaded.status, PrescriptionStatus::Pending);
    }

    #[test]
    fn list_scopes_through_appointment() {
        let conn = test_db();
        let p1 = make_user(&conn, "p1@example.com", Role::Patient);
        let p2 = make_user(&conn, "p2@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let a1 = make_appointment(&conn, p1.id, doc.id);
        let a2 = make_appointment(&conn, p2.id, doc.id);
        make_prescription(&conn, a1.id, doc.id);
        let mut rx2 = make_prescription(&conn, a2.id, doc.id);
        rx2.status = PrescriptionStatus::Approved;
        update_prescription(&conn, &rx2).unwrap();

        let mine = list_prescriptions(
            &conn,
            &PrescriptionFilter {
                patient_id: Some(p1.id),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(mine.len(), 1);

        let approved = list_prescriptions(
            &conn,
            &PrescriptionFilter {
                status: Some(PrescriptionStatus::Approved),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, rx2.id);
        assert_eq!(count_prescriptions(&conn).unwrap(), 2);
    }
}
