use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_enum, get_opt_datetime, get_uuid, DatabaseError};
use crate::models::*;

const VIDEO_COLUMNS: &str = "id, appointment_id, room_id, doctor_id, patient_id, status, start_time,
     end_time, recording_url, notes, created_at";

fn video_from_row(row: &Row) -> rusqlite::Result<VideoConsultation> {
    Ok(VideoConsultation {
        id: get_uuid(row, 0)?,
        appointment_id: get_uuid(row, 1)?,
        room_id: row.get(2)?,
        doctor_id: get_uuid(row, 3)?,
        patient_id: get_uuid(row, 4)?,
        status: get_enum(row, 5)?,
        start_time: get_opt_datetime(row, 6)?,
        end_time: get_opt_datetime(row, 7)?,
        recording_url: row.get(8)?,
        notes: row.get(9)?,
        created_at: get_datetime(row, 10)?,
    })
}

pub fn insert_video_consultation(
    conn: &Connection,
    video: &VideoConsultation,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO video_consultations (id, appointment_id, room_id, doctor_id, patient_id,
         status, start_time, end_time, recording_url, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            video.id.to_string(),
            video.appointment_id.to_string(),
            video.room_id,
            video.doctor_id.to_string(),
            video.patient_id.to_string(),
            video.status.as_str(),
            video.start_time.as_ref().map(fmt_datetime),
            video.end_time.as_ref().map(fmt_datetime),
            video.recording_url,
            video.notes,
            fmt_datetime(&video.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_video_consultation(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<VideoConsultation>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {VIDEO_COLUMNS} FROM video_consultations WHERE id = ?1"),
            params![id.to_string()],
            video_from_row,
        )
        .optional()?)
}

pub fn get_video_by_appointment(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<VideoConsultation>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {VIDEO_COLUMNS} FROM video_consultations WHERE appointment_id = ?1"),
            params![appointment_id.to_string()],
            video_from_row,
        )
        .optional()?)
}

pub fn update_video_consultation(
    conn: &Connection,
    video: &VideoConsultation,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE video_consultations SET status = ?2, start_time = ?3, end_time = ?4,
         recording_url = ?5, notes = ?6
         WHERE id = ?1",
        params![
            video.id.to_string(),
            video.status.as_str(),
            video.start_time.as_ref().map(fmt_datetime),
            video.end_time.as_ref().map(fmt_datetime),
            video.recording_url,
            video.notes,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("VideoConsultation", video.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::db::repository::fixtures::{make_appointment, make_doctor, make_user, test_db};

    #[test]
    fn one_room_per_appointment() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let appt = make_appointment(&conn, patient.id, doc.id);

        let video = VideoConsultation {
            id: Uuid::new_v4(),
            appointment_id: appt.id,
            room_id: "room-1".into(),
            doctor_id: doc.id,
            patient_id: patient.id,
            status: VideoStatus::Waiting,
            start_time: None,
            end_time: None,
            recording_url: None,
            notes: None,
            created_at: now(),
        };
        insert_video_consultation(&conn, &video).unwrap();

        let mut again = video.clone();
        again.id = Uuid::new_v4();
        again.room_id = "room-2".into();
        assert!(insert_video_consultation(&conn, &again).unwrap_err().is_constraint());

        let mut started = get_video_by_appointment(&conn, &appt.id).unwrap().unwrap();
        started.status = VideoStatus::Active;
        started.start_time = Some(now());
        update_video_consultation(&conn, &started).unwrap();
        let reloaded = get_video_consultation(&conn, &video.id).unwrap().unwrap();
        assert_eq!(reloaded.status, VideoStatus::Active);
        assert!(reloaded.start_time.is_some());
    }
}
