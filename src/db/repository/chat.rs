use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_enum, get_opt_datetime, get_opt_uuid, get_uuid, DatabaseError};
use crate::models::*;

const ROOM_COLUMNS: &str =
    "id, patient_id, doctor_id, appointment_id, is_active, last_message_at, created_at";

fn room_from_row(row: &Row) -> rusqlite::Result<ChatRoom> {
    Ok(ChatRoom {
        id: get_uuid(row, 0)?,
        patient_id: get_uuid(row, 1)?,
        doctor_id: get_uuid(row, 2)?,
        appointment_id: get_opt_uuid(row, 3)?,
        is_active: row.get(4)?,
        last_message_at: get_opt_datetime(row, 5)?,
        created_at: get_datetime(row, 6)?,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: get_uuid(row, 0)?,
        room_id: get_uuid(row, 1)?,
        sender_id: get_uuid(row, 2)?,
        recipient_id: get_uuid(row, 3)?,
        message: row.get(4)?,
        message_type: get_enum(row, 5)?,
        is_read: row.get(6)?,
        created_at: get_datetime(row, 7)?,
    })
}

pub fn insert_chat_room(conn: &Connection, room: &ChatRoom) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chat_rooms (id, patient_id, doctor_id, appointment_id, is_active,
         last_message_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            room.id.to_string(),
            room.patient_id.to_string(),
            room.doctor_id.to_string(),
            room.appointment_id.map(|id| id.to_string()),
            room.is_active,
            room.last_message_at.as_ref().map(fmt_datetime),
            fmt_datetime(&room.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_chat_room(conn: &Connection, id: &Uuid) -> Result<Option<ChatRoom>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?1"),
            params![id.to_string()],
            room_from_row,
        )
        .optional()?)
}

/// The open room between a patient and a doctor, if any.
pub fn find_active_room(
    conn: &Connection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
) -> Result<Option<ChatRoom>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ROOM_COLUMNS} FROM chat_rooms
                 WHERE patient_id = ?1 AND doctor_id = ?2 AND is_active = 1
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![patient_id.to_string(), doctor_id.to_string()],
            room_from_row,
        )
        .optional()?)
}

/// Rooms the user belongs to, most recently active first.
pub fn list_rooms_for_user(conn: &Connection, user_id: &Uuid) -> Result<Vec<ChatRoom>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ROOM_COLUMNS} FROM chat_rooms
         WHERE patient_id = ?1 OR doctor_id = ?1
         ORDER BY COALESCE(last_message_at, created_at) DESC"
    ))?;
    let rows = stmt.query_map(params![user_id.to_string()], room_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn set_room_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE chat_rooms SET is_active = ?2 WHERE id = ?1",
        params![id.to_string(), active],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("ChatRoom", id));
    }
    Ok(())
}

/// Store the message and bump the room's `last_message_at`.
pub fn insert_chat_message(conn: &Connection, msg: &ChatMessage) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO chat_messages (id, room_id, sender_id, recipient_id, message, message_type,
         is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            msg.id.to_string(),
            msg.room_id.to_string(),
            msg.sender_id.to_string(),
            msg.recipient_id.to_string(),
            msg.message,
            msg.message_type.as_str(),
            msg.is_read,
            fmt_datetime(&msg.created_at),
        ],
    )?;
    tx.execute(
        "UPDATE chat_rooms SET last_message_at = ?2 WHERE id = ?1",
        params![msg.room_id.to_string(), fmt_datetime(&msg.created_at)],
    )?;
    tx.commit()?;
    Ok(())
}

/// Oldest first, capped at the newest `limit` messages.
pub fn list_messages(
    conn: &Connection,
    room_id: &Uuid,
    limit: u32,
) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, sender_id, recipient_id, message, message_type, is_read, created_at
         FROM (
             SELECT rowid AS seq, id, room_id, sender_id, recipient_id, message, message_type,
                    is_read, created_at
             FROM chat_messages WHERE room_id = ?1
             ORDER BY created_at DESC, seq DESC LIMIT ?2
         ) ORDER BY created_at ASC, seq ASC",
    )?;
    let rows = stmt.query_map(params![room_id.to_string(), limit], message_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Mark everything addressed to `recipient_id` in the room as read.
pub fn mark_room_read(
    conn: &Connection,
    room_id: &Uuid,
    recipient_id: &Uuid,
) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "UPDATE chat_messages SET is_read = 1
         WHERE room_id = ?1 AND recipient_id = ?2 AND is_read = 0",
        params![room_id.to_string(), recipient_id.to_string()],
    )?)
}

pub fn unread_count(conn: &Connection, recipient_id: &Uuid) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM chat_messages WHERE recipient_id = ?1 AND is_read = 0",
        params![recipient_id.to_string()],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::db::repository::fixtures::{make_doctor, make_user, test_db};
    use chrono::Duration;

    fn open_room(conn: &Connection, patient: Uuid, doctor: Uuid) -> ChatRoom {
        let room = ChatRoom {
            id: Uuid::new_v4(),
            patient_id: patient,
            doctor_id: doctor,
            appointment_id: None,
            is_active: true,
            last_message_at: None,
            created_at: now(),
        };
        insert_chat_room(conn, &room).unwrap();
        room
    }

    fn message(room: &ChatRoom, from: Uuid, to: Uuid, text: &str, offset: i64) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            room_id: room.id,
            sender_id: from,
            recipient_id: to,
            message: text.into(),
            message_type: MessageType::Text,
            is_read: false,
            created_at: now() + Duration::seconds(offset),
        }
    }

    #[test]
    fn messages_update_room_and_unread_counts() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let room = open_room(&conn, patient.id, doc.id);

        insert_chat_message(&conn, &message(&room, patient.id, doc.id, "hello", 0)).unwrap();
        insert_chat_message(&conn, &message(&room, patient.id, doc.id, "are you there", 1)).unwrap();
        insert_chat_message(&conn, &message(&room, doc.id, patient.id, "yes", 2)).unwrap();

        assert_eq!(unread_count(&conn, &doc.id).unwrap(), 2);
        assert_eq!(mark_room_read(&conn, &room.id, &doc.id).unwrap(), 2);
        assert_eq!(unread_count(&conn, &doc.id).unwrap(), 0);
        assert_eq!(unread_count(&conn, &patient.id).unwrap(), 1);

        let reloaded = get_chat_room(&conn, &room.id).unwrap().unwrap();
        assert!(reloaded.last_message_at.is_some());
    }

    #[test]
    fn list_messages_returns_latest_window_in_order() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let room = open_room(&conn, patient.id, doc.id);
        for i in 0..5 {
            insert_chat_message(&conn, &message(&room, patient.id, doc.id, &format!("m{i}"), i)).unwrap();
        }

        let window = list_messages(&conn, &room.id, 3).unwrap();
        let texts: Vec<_> = window.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn same_second_messages_keep_send_order() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let room = open_room(&conn, patient.id, doc.id);
        let sent_at = now();
        for text in ["first", "second", "third"] {
            let mut msg = message(&room, patient.id, doc.id, text, 0);
            msg.created_at = sent_at;
            insert_chat_message(&conn, &msg).unwrap();
        }

        let texts: Vec<_> = list_messages(&conn, &room.id, 50)
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);

        let window: Vec<_> = list_messages(&conn, &room.id, 2)
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(window, vec!["second", "third"]);
    }

    #[test]
    fn active_room_lookup_ignores_closed_rooms() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let room = open_room(&conn, patient.id, doc.id);
        assert_eq!(find_active_room(&conn, &patient.id, &doc.id).unwrap().unwrap().id, room.id);

        set_room_active(&conn, &room.id, false).unwrap();
        assert!(find_active_room(&conn, &patient.id, &doc.id).unwrap().is_none());
        assert_eq!(list_rooms_for_user(&conn, &doc.id).unwrap().len(), 1);
    }
}
