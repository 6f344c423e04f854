use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_json, get_opt_uuid, get_uuid, DatabaseError};
use crate::models::*;

pub fn insert_medical_history(
    conn: &Connection,
    entry: &MedicalHistoryEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medical_history (id, patient_id, appointment_id, recorded_by, diagnosis,
         symptoms, treatment_plan, notes, attachments, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id.to_string(),
            entry.patient_id.to_string(),
            entry.appointment_id.map(|id| id.to_string()),
            entry.recorded_by.map(|id| id.to_string()),
            entry.diagnosis,
            entry.symptoms,
            entry.treatment_plan,
            entry.notes,
            serde_json::to_string(&entry.attachments)?,
            fmt_datetime(&entry.created_at),
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn list_medical_history(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<MedicalHistoryEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, appointment_id, recorded_by, diagnosis, symptoms,
                treatment_plan, notes, attachments, created_at
         FROM medical_history WHERE patient_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok(MedicalHistoryEntry {
            id: get_uuid(row, 0)?,
            patient_id: get_uuid(row, 1)?,
            appointment_id: get_opt_uuid(row, 2)?,
            recorded_by: get_opt_uuid(row, 3)?,
            diagnosis: row.get(4)?,
            symptoms: row.get(5)?,
            treatment_plan: row.get(6)?,
            notes: row.get(7)?,
            attachments: get_json(row, 8)?,
            created_at: get_datetime(row, 9)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::db::repository::fixtures::{make_appointment, make_doctor, make_user, test_db};

    #[test]
    fn history_is_per_patient() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let other = make_user(&conn, "other@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let appt = make_appointment(&conn, patient.id, doc.id);

        insert_medical_history(
            &conn,
            &MedicalHistoryEntry {
                id: Uuid::new_v4(),
                patient_id: patient.id,
                appointment_id: Some(appt.id),
                recorded_by: Some(doc.id),
                diagnosis: Some("Malaria".into()),
                symptoms: Some("fever".into()),
                treatment_plan: Some("ACT course".into()),
                notes: None,
                attachments: vec!["lab-123.pdf".into()],
                created_at: now(),
            },
        )
        .unwrap();

        let history = list_medical_history(&conn, &patient.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].attachments, vec!["lab-123.pdf"]);
        assert!(list_medical_history(&conn, &other.id).unwrap().is_empty());
    }
}
