//! Video consultation rooms attached to appointments.
//!
//! A room moves waiting → active → ended. Media transport is out of scope;
//! participants get a short-lived `video_room` token naming the room.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::appointments::load_visible;
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser};
use crate::api::validation;
use crate::core_state::CoreState;
use crate::crypto::TokenKind;
use crate::db::{now, repository};
use crate::models::{AppointmentStatus, VideoConsultation, VideoStatus};

#[derive(Debug, Deserialize)]
pub struct CreateVideoRequest {
    pub appointment_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndVideoRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomTokenResponse {
    pub token: String,
    pub room_id: String,
    pub expires_in: i64,
}

fn load_video(
    conn: &rusqlite::Connection,
    caller: &AuthUser,
    id: &str,
) -> Result<VideoConsultation, ApiError> {
    let id = parse_id(id, "consultation")?;
    let video = repository::get_video_consultation(conn, &id)?
        .ok_or_else(|| ApiError::not_found("Consultation not found"))?;
    if !video.is_participant(&caller.user_id) && !caller.role.is_admin() {
        return Err(ApiError::forbidden("Not a participant in this consultation"));
    }
    Ok(video)
}

/// Start and end belong to the consulting doctor or an administrator.
fn require_host(caller: &AuthUser, video: &VideoConsultation) -> Result<(), ApiError> {
    if video.doctor_id == caller.user_id || caller.role.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the consulting clinician can do this"))
    }
}

/// `POST /api/consultations/video`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<VideoConsultation>), ApiError> {
    let conn = ctx.core.open_db()?;
    let appt = load_visible(&conn, &caller, &req.appointment_id)?;
    if appt.clinician_id != caller.user_id && !caller.role.is_admin() {
        return Err(ApiError::forbidden("Only the assigned clinician can open a video room"));
    }
    if appt.status.is_terminal() {
        return Err(ApiError::bad_request(format!(
            "Appointment is {}",
            appt.status
        )));
    }
    if repository::get_video_by_appointment(&conn, &appt.id)?.is_some() {
        return Err(ApiError::Conflict(
            "Video consultation already exists for this appointment".into(),
        ));
    }

    let video = VideoConsultation {
        id: Uuid::new_v4(),
        appointment_id: appt.id,
        room_id: format!("room-{}", Uuid::new_v4().simple()),
        doctor_id: appt.clinician_id,
        patient_id: appt.patient_id,
        status: VideoStatus::Waiting,
        start_time: None,
        end_time: None,
        recording_url: None,
        notes: None,
        created_at: now(),
    };
    repository::insert_video_consultation(&conn, &video)?;
    tracing::info!(consultation_id = %video.id, appointment_id = %appt.id, "Video room created");
    Ok((StatusCode::CREATED, Json(video)))
}

/// `GET /api/consultations/video/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<VideoConsultation>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(load_video(&conn, &caller, &id)?))
}

/// `POST /api/consultations/video/:id/start`: also moves the appointment in progress.
pub async fn start(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<VideoConsultation>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut video = load_video(&conn, &caller, &id)?;
    require_host(&caller, &video)?;
    if video.status != VideoStatus::Waiting {
        return Err(ApiError::bad_request(format!(
            "Consultation is already {}",
            video.status
        )));
    }

    video.status = VideoStatus::Active;
    video.start_time = Some(now());
    let tx = conn.unchecked_transaction()?;
    repository::update_video_consultation(&tx, &video)?;
    if let Some(mut appt) = repository::get_appointment(&tx, &video.appointment_id)? {
        if appt.status == AppointmentStatus::Scheduled {
            appt.status = AppointmentStatus::InProgress;
            appt.updated_at = Some(now());
            repository::update_appointment(&tx, &appt)?;
        }
    }
    tx.commit()?;
    Ok(Json(video))
}

/// `POST /api/consultations/video/:id/end`
pub async fn end(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<EndVideoRequest>>,
) -> Result<Json<VideoConsultation>, ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let conn = ctx.core.open_db()?;
    let mut video = load_video(&conn, &caller, &id)?;
    require_host(&caller, &video)?;
    if video.status != VideoStatus::Active {
        return Err(ApiError::bad_request("Consultation is not active"));
    }

    video.status = VideoStatus::Ended;
    video.end_time = Some(now());
    if req.notes.is_some() {
        video.notes = validation::optional_text(req.notes.as_deref(), "Notes", 5000)?;
    }
    repository::update_video_consultation(&conn, &video)?;
    tracing::info!(consultation_id = %video.id, "Video consultation ended");
    Ok(Json(video))
}

/// `POST /api/consultations/video/:id/token`: participants only.
pub async fn join_token(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<RoomTokenResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let video = load_video(&conn, &caller, &id)?;
    if !video.is_participant(&caller.user_id) {
        return Err(ApiError::forbidden("Not a participant in this consultation"));
    }
    if video.status == VideoStatus::Ended {
        return Err(ApiError::bad_request("Consultation has ended"));
    }

    let user = CoreState::require_user(&conn, &caller.user_id)?;
    let claims = ctx
        .core
        .claims_for(&user, TokenKind::VideoRoom)
        .with_room(&video.room_id);
    let token = ctx.core.tokens().sign(&claims)?;
    Ok(Json(RoomTokenResponse {
        token,
        room_id: video.room_id,
        expires_in: claims.expires_in(),
    }))
}
