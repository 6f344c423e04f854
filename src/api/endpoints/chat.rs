//! Patient–doctor messaging rooms.
//!
//! One active room per patient/doctor pair; opening it again returns the
//! existing room. Messages are stored and polled, there is no push channel.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser, LimitQuery, MessageResponse};
use crate::api::validation;
use crate::db::{now, repository};
use crate::models::{ChatMessage, ChatRoom, MessageType, Role};

const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct OpenRoomRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    pub message_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub marked_read: usize,
}

fn load_room(conn: &rusqlite::Connection, caller: &AuthUser, id: &str) -> Result<ChatRoom, ApiError> {
    let id = parse_id(id, "chat room")?;
    let room = repository::get_chat_room(conn, &id)?
        .ok_or_else(|| ApiError::not_found("Chat room not found"))?;
    if !room.is_member(&caller.user_id) {
        return Err(ApiError::forbidden("Not a member of this chat room"));
    }
    Ok(room)
}

/// The other party must be an active account holding `role`.
fn require_party(conn: &rusqlite::Connection, id: Option<Uuid>, role: Role) -> Result<Uuid, ApiError> {
    let label = if role == Role::Doctor { "doctor" } else { "patient" };
    let id = id.ok_or_else(|| ApiError::bad_request(format!("{label}_id is required")))?;
    match repository::get_user(conn, &id)? {
        Some(user) if user.role == role && user.is_active => Ok(user.id),
        _ => Err(ApiError::not_found(format!("The {label} was not found"))),
    }
}

/// `POST /api/chat/rooms`: patients name a doctor, doctors name a patient.
pub async fn open_room(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<OpenRoomRequest>,
) -> Result<(StatusCode, Json<ChatRoom>), ApiError> {
    let conn = ctx.core.open_db()?;
    let (patient_id, doctor_id) = match caller.role {
        Role::Patient => (caller.user_id, require_party(&conn, req.doctor_id, Role::Doctor)?),
        Role::Doctor => (require_party(&conn, req.patient_id, Role::Patient)?, caller.user_id),
        _ => return Err(ApiError::forbidden("Only patients and doctors can open chat rooms")),
    };

    if let Some(appointment_id) = req.appointment_id {
        let appt = repository::get_appointment(&conn, &appointment_id)?
            .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
        if appt.patient_id != patient_id || appt.clinician_id != doctor_id {
            return Err(ApiError::bad_request(
                "Appointment does not belong to this patient and doctor",
            ));
        }
    }

    if let Some(room) = repository::find_active_room(&conn, &patient_id, &doctor_id)? {
        return Ok((StatusCode::OK, Json(room)));
    }

    let room = ChatRoom {
        id: Uuid::new_v4(),
        patient_id,
        doctor_id,
        appointment_id: req.appointment_id,
        is_active: true,
        last_message_at: None,
        created_at: now(),
    };
    repository::insert_chat_room(&conn, &room)?;
    tracing::debug!(room_id = %room.id, "Chat room opened");
    Ok((StatusCode::CREATED, Json(room)))
}

/// `GET /api/chat/rooms`
pub async fn list_rooms(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<ChatRoom>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::list_rooms_for_user(&conn, &caller.user_id)?))
}

/// `POST /api/chat/rooms/:id/messages`
pub async fn send_message(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let message = validation::required_text(&req.message, "Message", MAX_MESSAGE_CHARS)?;
    let message_type = match req.message_type.as_deref() {
        Some(raw) => validation::enum_value::<MessageType>(raw, "message type", MessageType::ALL)?,
        None => MessageType::Text,
    };

    let conn = ctx.core.open_db()?;
    let room = load_room(&conn, &caller, &id)?;
    if !room.is_active {
        return Err(ApiError::bad_request("Chat room is closed"));
    }

    let msg = ChatMessage {
        id: Uuid::new_v4(),
        room_id: room.id,
        sender_id: caller.user_id,
        recipient_id: room.counterpart(&caller.user_id),
        message,
        message_type,
        is_read: false,
        created_at: now(),
    };
    repository::insert_chat_message(&conn, &msg)?;
    Ok((StatusCode::CREATED, Json(msg)))
}

/// `GET /api/chat/rooms/:id/messages?limit=`: oldest first.
pub async fn list_messages(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(limit): Query<LimitQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let room = load_room(&conn, &caller, &id)?;
    let messages = repository::list_messages(&conn, &room.id, limit.resolve(50, 200))?;
    Ok(Json(messages))
}

/// `POST /api/chat/rooms/:id/read`
pub async fn mark_read(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ReadResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let room = load_room(&conn, &caller, &id)?;
    let marked_read = repository::mark_room_read(&conn, &room.id, &caller.user_id)?;
    Ok(Json(ReadResponse { marked_read }))
}

/// `GET /api/chat/unread`
pub async fn unread(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(UnreadResponse {
        unread: repository::unread_count(&conn, &caller.user_id)?,
    }))
}

/// `POST /api/chat/rooms/:id/close`: either member may close it.
pub async fn close_room(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let room = load_room(&conn, &caller, &id)?;
    repository::set_room_active(&conn, &room.id, false)?;
    Ok(Json(MessageResponse::new("Chat room closed")))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::endpoints::test_support::TestApp;
    use crate::models::Role;

    #[tokio::test]
    async fn open_room_is_reused_for_the_same_pair() {
        let app = TestApp::new();
        let (patient, patient_token) = app.user("pat@example.com", Role::Patient);
        let (doctor, doctor_token) = app.user("doc@example.com", Role::Doctor);
        let (_, nurse) = app.user("nurse@example.com", Role::Nurse);

        let (status, first) = app
            .post("/api/chat/rooms", Some(&patient_token), json!({"doctor_id": doctor.id}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{first}");

        let (status, again) = app
            .post("/api/chat/rooms", Some(&doctor_token), json!({"patient_id": patient.id}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["id"], first["id"]);

        let (status, _) = app
            .post("/api/chat/rooms", Some(&nurse), json!({"patient_id": patient.id}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .post("/api/chat/rooms", Some(&patient_token), json!({"doctor_id": patient.id}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn messages_flow_and_unread_counts() {
        let app = TestApp::new();
        let (_, patient_token) = app.user("pat@example.com", Role::Patient);
        let (doctor, doctor_token) = app.user("doc@example.com", Role::Doctor);
        let (_, outsider) = app.user("pat2@example.com", Role::Patient);

        let (_, room) = app
            .post("/api/chat/rooms", Some(&patient_token), json!({"doctor_id": doctor.id}))
            .await;
        let room_id = room["id"].as_str().unwrap().to_string();
        let messages = format!("/api/chat/rooms/{room_id}/messages");

        for text in ["Hello doctor", "I still have a fever"] {
            let (status, _) = app
                .post(&messages, Some(&patient_token), json!({"message": text}))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, _) = app
            .post(&messages, Some(&patient_token), json!({"message": "x", "message_type": "video"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, json) = app.get("/api/chat/unread", Some(&doctor_token)).await;
        assert_eq!(json["unread"], 2);

        let (status, _) = app.get(&messages, Some(&outsider)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, json) = app.get(&format!("{messages}?limit=1"), Some(&doctor_token)).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["message"], "I still have a fever");

        let (_, json) = app
            .post(&format!("/api/chat/rooms/{room_id}/read"), Some(&doctor_token), json!({}))
            .await;
        assert_eq!(json["marked_read"], 2);
        let (_, json) = app.get("/api/chat/unread", Some(&doctor_token)).await;
        assert_eq!(json["unread"], 0);

        let (status, _) = app
            .post(&format!("/api/chat/rooms/{room_id}/close"), Some(&doctor_token), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .post(&messages, Some(&patient_token), json!({"message": "hello?"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Closed rooms are not reused.
        let (status, _) = app
            .post("/api/chat/rooms", Some(&patient_token), json!({"doctor_id": doctor.id}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
