use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_enum, get_opt_datetime, get_uuid, now, DatabaseError};
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "a.id, a.patient_id, a.clinician_id, a.visit_type, a.specialization,
     a.scheduled_at, a.status, a.triage_notes, a.cost, a.cancellation_reason, a.created_at,
     a.updated_at";

fn appointment_from_row(row: &Row) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: get_uuid(row, 0)?,
        patient_id: get_uuid(row, 1)?,
        clinician_id: get_uuid(row, 2)?,
        visit_type: row.get(3)?,
        specialization: row.get(4)?,
        scheduled_at: get_datetime(row, 5)?,
        status: get_enum(row, 6)?,
        triage_notes: row.get(7)?,
        cost: row.get(8)?,
        cancellation_reason: row.get(9)?,
        created_at: get_datetime(row, 10)?,
        updated_at: get_opt_datetime(row, 11)?,
    })
}

/// Row filter; `None` fields match everything.
#[derive(Debug, Default, Clone)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub clinician_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, clinician_id, visit_type, specialization,
         scheduled_at, status, triage_notes, cost, cancellation_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.clinician_id.to_string(),
            appt.visit_type,
            appt.specialization,
            fmt_datetime(&appt.scheduled_at),
            appt.status.as_str(),
            appt.triage_notes,
            appt.cost,
            appt.cancellation_reason,
            fmt_datetime(&appt.created_at),
            appt.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1"),
            params![id.to_string()],
            appointment_from_row,
        )
        .optional()?)
}

/// Most recent `scheduled_at` first.
pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments a
         WHERE (?1 IS NULL OR a.patient_id = ?1)
           AND (?2 IS NULL OR a.clinician_id = ?2)
           AND (?3 IS NULL OR a.status = ?3)
         ORDER BY a.scheduled_at DESC"
    ))?;
    let rows = stmt.query_map(
        params![
            filter.patient_id.map(|id| id.to_string()),
            filter.clinician_id.map(|id| id.to_string()),
            filter.status.map(|s| s.as_str()),
        ],
        appointment_from_row,
    )?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Overwrite every mutable column from `appt`.
pub fn update_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET clinician_id = ?2, visit_type = ?3, specialization = ?4,
         scheduled_at = ?5, status = ?6, triage_notes = ?7, cost = ?8,
         cancellation_reason = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            appt.id.to_string(),
            appt.clinician_id.to_string(),
            appt.visit_type,
            appt.specialization,
            fmt_datetime(&appt.scheduled_at),
            appt.status.as_str(),
            appt.triage_notes,
            appt.cost,
            appt.cancellation_reason,
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Appointment", appt.id));
    }
    Ok(())
}

pub fn count_appointments(
    conn: &Connection,
    status: Option<AppointmentStatus>,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM appointments WHERE (?1 IS NULL OR status = ?1)",
        params![status.map(|s| s.as_str())],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_appointment, make_doctor, make_user, test_db};
    use chrono::Duration;

    #[test]
    fn list_orders_by_schedule_descending() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let early = make_appointment(&conn, patient.id, doc.id);
        let mut late = make_appointment(&conn, patient.id, doc.id);
        late.scheduled_at = early.scheduled_at + Duration::days(3);
        update_appointment(&conn, &late).unwrap();

        let all = list_appointments(&conn, &AppointmentFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, late.id);
        assert_eq!(all[1].id, early.id);
    }

    #[test]
    fn filter_by_party_and_status() {
        let conn = test_db();
        let p1 = make_user(&conn, "p1@example.com", Role::Patient);
        let p2 = make_user(&conn, "p2@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        make_appointment(&conn, p1.id, doc.id);
        let mut other = make_appointment(&conn, p2.id, doc.id);
        other.status = AppointmentStatus::Cancelled;
        other.cancellation_reason = Some("travel".into());
        update_appointment(&conn, &other).unwrap();

        let mine = list_appointments(
            &conn,
            &AppointmentFilter {
                patient_id: Some(p1.id),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(mine.len(), 1);

        let cancelled = list_appointments(
            &conn,
            &AppointmentFilter {
                clinician_id: Some(doc.id),
                status: Some(AppointmentStatus::Cancelled),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].cancellation_reason.as_deref(), Some("travel"));
        assert_eq!(count_appointments(&conn, Some(AppointmentStatus::Scheduled)).unwrap(), 1);
        assert_eq!(count_appointments(&conn, None).unwrap(), 2);
    }

    #[test]
    fn unknown_patient_rejected_by_foreign_key() {
        let conn = test_db();
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let appt = Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            clinician_id: doc.id,
            visit_type: "consultation".into(),
            specialization: None,
            scheduled_at: now(),
            status: AppointmentStatus::Scheduled,
            triage_notes: None,
            cost: None,
            cancellation_reason: None,
            created_at: now(),
            updated_at: None,
        };
        assert!(insert_appointment(&conn, &appt).is_err());
    }
}
