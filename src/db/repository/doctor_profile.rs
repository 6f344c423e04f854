//! Doctor profile sections keyed by `doctors.id`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    fmt_date, fmt_datetime, get_datetime, get_enum, get_json, get_opt_date, get_opt_datetime,
    get_uuid, now, DatabaseError,
};
use crate::models::*;

// ── Education ───────────────────────────────────────────

const EDUCATION_COLUMNS: &str = "id, doctor_id, title, institution, year, education_type,
     license_number, expiry_date, created_at, updated_at";

fn education_from_row(row: &Row) -> rusqlite::Result<DoctorEducation> {
    Ok(DoctorEducation {
        id: get_uuid(row, 0)?,
        doctor_id: get_uuid(row, 1)?,
        title: row.get(2)?,
        institution: row.get(3)?,
        year: row.get(4)?,
        education_type: get_enum(row, 5)?,
        license_number: row.get(6)?,
        expiry_date: get_opt_date(row, 7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_opt_datetime(row, 9)?,
    })
}

pub fn insert_education(conn: &Connection, edu: &DoctorEducation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_education (id, doctor_id, title, institution, year, education_type,
         license_number, expiry_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            edu.id.to_string(),
            edu.doctor_id.to_string(),
            edu.title,
            edu.institution,
            edu.year,
            edu.education_type.as_str(),
            edu.license_number,
            edu.expiry_date.as_ref().map(fmt_date),
            fmt_datetime(&edu.created_at),
            edu.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_education(conn: &Connection, id: &Uuid) -> Result<Option<DoctorEducation>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {EDUCATION_COLUMNS} FROM doctor_education WHERE id = ?1"),
            params![id.to_string()],
            education_from_row,
        )
        .optional()?)
}

/// Most recent year first.
pub fn list_education(conn: &Connection, doctor_id: &Uuid) -> Result<Vec<DoctorEducation>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EDUCATION_COLUMNS} FROM doctor_education WHERE doctor_id = ?1
         ORDER BY year DESC, title"
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string()], education_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_education(conn: &Connection, edu: &DoctorEducation) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctor_education SET title = ?2, institution = ?3, year = ?4,
         education_type = ?5, license_number = ?6, expiry_date = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            edu.id.to_string(),
            edu.title,
            edu.institution,
            edu.year,
            edu.education_type.as_str(),
            edu.license_number,
            edu.expiry_date.as_ref().map(fmt_date),
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("DoctorEducation", edu.id));
    }
    Ok(())
}

pub fn delete_education(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM doctor_education WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(deleted > 0)
}

// ── Contact information ─────────────────────────────────

/// Creates the default row on first read.
pub fn get_or_create_contact_info(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<DoctorContactInfo, DatabaseError> {
    let stored = conn
        .query_row(
            "SELECT hospital, department, location, languages, consultation_fee, response_rate,
                    on_time_rate, patient_satisfaction
             FROM doctor_contact_info WHERE doctor_id = ?1",
            params![doctor_id.to_string()],
            |row| {
                Ok(DoctorContactInfo {
                    hospital: row.get(0)?,
                    department: row.get(1)?,
                    location: row.get(2)?,
                    languages: get_json(row, 3)?,
                    consultation_fee: row.get(4)?,
                    response_rate: row.get(5)?,
                    on_time_rate: row.get(6)?,
                    patient_satisfaction: row.get(7)?,
                })
            },
        )
        .optional()?;
    match stored {
        Some(info) => Ok(info),
        None => {
            let info = DoctorContactInfo::default();
            upsert_contact_info(conn, doctor_id, &info)?;
            Ok(info)
        }
    }
}

pub fn upsert_contact_info(
    conn: &Connection,
    doctor_id: &Uuid,
    info: &DoctorContactInfo,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_contact_info (doctor_id, hospital, department, location, languages,
         consultation_fee, response_rate, on_time_rate, patient_satisfaction, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(doctor_id) DO UPDATE SET
             hospital = excluded.hospital, department = excluded.department,
             location = excluded.location, languages = excluded.languages,
             consultation_fee = excluded.consultation_fee,
             response_rate = excluded.response_rate, on_time_rate = excluded.on_time_rate,
             patient_satisfaction = excluded.patient_satisfaction,
             updated_at = excluded.updated_at",
        params![
            doctor_id.to_string(),
            info.hospital,
            info.department,
            info.location,
            serde_json::to_string(&info.languages)?,
            info.consultation_fee,
            info.response_rate,
            info.on_time_rate,
            info.patient_satisfaction,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}

// ── Availability ────────────────────────────────────────

const AVAILABILITY_COLUMNS: &str = "id, doctor_id, day, is_open, start_time, end_time, break_start,
     break_end, appointment_duration, buffer_time, max_appointments_per_day";

fn availability_from_row(row: &Row) -> rusqlite::Result<DoctorAvailability> {
    Ok(DoctorAvailability {
        id: get_uuid(row, 0)?,
        doctor_id: get_uuid(row, 1)?,
        day: get_enum(row, 2)?,
        is_open: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        break_start: row.get(6)?,
        break_end: row.get(7)?,
        appointment_duration: row.get(8)?,
        buffer_time: row.get(9)?,
        max_appointments_per_day: row.get(10)?,
    })
}

/// Insert or replace the row for `slot.day`; the stored id wins on conflict.
pub fn upsert_availability(conn: &Connection, slot: &DoctorAvailability) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_availability (id, doctor_id, day, day_index, is_open, start_time,
         end_time, break_start, break_end, appointment_duration, buffer_time,
         max_appointments_per_day, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(doctor_id, day) DO UPDATE SET
             is_open = excluded.is_open, start_time = excluded.start_time,
             end_time = excluded.end_time, break_start = excluded.break_start,
             break_end = excluded.break_end,
             appointment_duration = excluded.appointment_duration,
             buffer_time = excluded.buffer_time,
             max_appointments_per_day = excluded.max_appointments_per_day,
             updated_at = excluded.updated_at",
        params![
            slot.id.to_string(),
            slot.doctor_id.to_string(),
            slot.day.as_str(),
            slot.day.index(),
            slot.is_open,
            slot.start_time,
            slot.end_time,
            slot.break_start,
            slot.break_end,
            slot.appointment_duration,
            slot.buffer_time,
            slot.max_appointments_per_day,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}

pub fn get_availability(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<DoctorAvailability>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {AVAILABILITY_COLUMNS} FROM doctor_availability WHERE id = ?1"),
            params![id.to_string()],
            availability_from_row,
        )
        .optional()?)
}

/// Monday through Sunday; seeds the default week on first read.
pub fn list_or_seed_availability(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<DoctorAvailability>, DatabaseError> {
    let existing = list_availability(conn, doctor_id)?;
    if !existing.is_empty() {
        return Ok(existing);
    }
    let tx = conn.unchecked_transaction()?;
    for day in Weekday::ALL {
        upsert_availability(&tx, &DoctorAvailability::default_for(*doctor_id, *day))?;
    }
    tx.commit()?;
    list_availability(conn, doctor_id)
}

fn list_availability(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<DoctorAvailability>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AVAILABILITY_COLUMNS} FROM doctor_availability WHERE doctor_id = ?1
         ORDER BY day_index"
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string()], availability_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

// ── Settings ────────────────────────────────────────────

/// Creates the default row on first read.
pub fn get_or_create_settings(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<DoctorSettings, DatabaseError> {
    let stored = conn
        .query_row(
            "SELECT show_profile_to_patients, show_rating_reviews, allow_online_booking,
                    show_availability, email_notifications, sms_notifications,
                    appointment_reminders, new_appointment_requests, cancellation_alerts,
                    patient_messages, weekly_summary, marketing_emails,
                    in_person_consultations, video_consultations, phone_consultations,
                    chat_consultations
             FROM doctor_settings WHERE doctor_id = ?1",
            params![doctor_id.to_string()],
            |row| {
                Ok(DoctorSettings {
                    show_profile_to_patients: row.get(0)?,
                    show_rating_reviews: row.get(1)?,
                    allow_online_booking: row.get(2)?,
                    show_availability: row.get(3)?,
                    email_notifications: row.get(4)?,
                    sms_notifications: row.get(5)?,
                    appointment_reminders: row.get(6)?,
                    new_appointment_requests: row.get(7)?,
                    cancellation_alerts: row.get(8)?,
                    patient_messages: row.get(9)?,
                    weekly_summary: row.get(10)?,
                    marketing_emails: row.get(11)?,
                    in_person_consultations: row.get(12)?,
                    video_consultations: row.get(13)?,
                    phone_consultations: row.get(14)?,
                    chat_consultations: row.get(15)?,
                })
            },
        )
        .optional()?;
    match stored {
        Some(settings) => Ok(settings),
        None => {
            let settings = DoctorSettings::default();
            upsert_settings(conn, doctor_id, &settings)?;
            Ok(settings)
        }
    }
}

pub fn upsert_settings(
    conn: &Connection,
    doctor_id: &Uuid,
    s: &DoctorSettings,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_settings (doctor_id, show_profile_to_patients, show_rating_reviews,
         allow_online_booking, show_availability, email_notifications, sms_notifications,
         appointment_reminders, new_appointment_requests, cancellation_alerts, patient_messages,
         weekly_summary, marketing_emails, in_person_consultations, video_consultations,
         phone_consultations, chat_consultations, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(doctor_id) DO UPDATE SET
             show_profile_to_patients = excluded.show_profile_to_patients,
             show_rating_reviews = excluded.show_rating_reviews,
             allow_online_booking = excluded.allow_online_booking,
             show_availability = excluded.show_availability,
             email_notifications = excluded.email_notifications,
             sms_notifications = excluded.sms_notifications,
             appointment_reminders = excluded.appointment_reminders,
             new_appointment_requests = excluded.new_appointment_requests,
             cancellation_alerts = excluded.cancellation_alerts,
             patient_messages = excluded.patient_messages,
             weekly_summary = excluded.weekly_summary,
             marketing_emails = excluded.marketing_emails,
             in_person_consultations = excluded.in_person_consultations,
             video_consultations = excluded.video_consultations,
             phone_consultations = excluded.phone_consultations,
             chat_consultations = excluded.chat_consultations,
             updated_at = excluded.updated_at",
        params![
            doctor_id.to_string(),
            s.show_profile_to_patients,
            s.show_rating_reviews,
            s.allow_online_booking,
            s.show_availability,
            s.email_notifications,
            s.sms_notifications,
            s.appointment_reminders,
            s.new_appointment_requests,
            s.cancellation_alerts,
            s.patient_messages,
            s.weekly_summary,
            s.marketing_emails,
            s.in_person_consultations,
            s.video_consultations,
            s.phone_consultations,
            s.chat_consultations,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}
