//! Appointment booking and workflow.
//!
//! scheduled → in_progress → completed, with cancellation from either open
//! state. Completed and cancelled appointments are frozen.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser};
use crate::api::validation;
use crate::authorization::{self, RecordScope};
use crate::db::{now, repository};
use crate::models::{Appointment, AppointmentStatus, Role};

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Defaults to the caller when a patient books.
    pub patient_id: Option<Uuid>,
    pub clinician_id: Uuid,
    pub visit_type: String,
    pub specialization: Option<String>,
    pub scheduled_at: String,
    pub triage_notes: Option<String>,
    pub cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub visit_type: Option<String>,
    pub specialization: Option<String>,
    pub triage_notes: Option<String>,
    pub cost: Option<f64>,
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
    pub reason: Option<String>,
}

/// Load an appointment the caller may see.
pub(crate) fn load_visible(
    conn: &Connection,
    caller: &AuthUser,
    id: &Uuid,
) -> Result<Appointment, ApiError> {
    let appt = repository::get_appointment(conn, id)?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    if !authorization::check_appointment_access(&caller.actor(), &appt).allowed {
        return Err(ApiError::forbidden("Not authorized to access this appointment"));
    }
    Ok(appt)
}

fn future_datetime(raw: &str) -> Result<chrono::NaiveDateTime, ApiError> {
    let at = validation::datetime(raw, "scheduled_at")?;
    if at <= now() {
        return Err(ApiError::bad_request("Appointment must be scheduled in the future"));
    }
    Ok(at)
}

fn cost(raw: Option<f64>) -> Result<Option<f64>, ApiError> {
    match raw {
        Some(c) if !c.is_finite() || c < 0.0 => Err(ApiError::bad_request("Cost cannot be negative")),
        other => Ok(other),
    }
}

fn ensure_open(appt: &Appointment) -> Result<(), ApiError> {
    if appt.status.is_terminal() {
        return Err(ApiError::bad_request(format!(
            "Cannot modify a {} appointment",
            appt.status
        )));
    }
    Ok(())
}

/// `POST /api/appointments`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let patient_id = match (req.patient_id, caller.role) {
        (Some(id), _) => id,
        (None, Role::Patient) => caller.user_id,
        (None, _) => return Err(ApiError::bad_request("patient_id is required")),
    };
    if !authorization::can_book_for(&caller.actor(), &patient_id) {
        return Err(ApiError::forbidden("Not authorized to book for this patient"));
    }
    let visit_type = validation::required_text(&req.visit_type, "Visit type", 50)?;
    let specialization = validation::optional_text(req.specialization.as_deref(), "Specialization", 100)?;
    let triage_notes = validation::optional_text(req.triage_notes.as_deref(), "Triage notes", 2000)?;
    let scheduled_at = future_datetime(&req.scheduled_at)?;
    let cost = cost(req.cost)?;

    let conn = ctx.core.open_db()?;
    let patient = repository::get_user(&conn, &patient_id)?
        .filter(|u| u.role == Role::Patient)
        .ok_or_else(|| ApiError::not_found("Patient not found"))?;
    let clinician = repository::get_user(&conn, &req.clinician_id)?
        .filter(|u| u.role.is_clinician() && u.is_active)
        .ok_or_else(|| ApiError::not_found("Clinician not found"))?;

    let doctor = repository::get_doctor_by_user(&conn, &clinician.id)?;
    let cost = match cost {
        Some(c) => Some(c),
        None => doctor.as_ref().and_then(|d| d.consultation_fee),
    };
    let specialization = specialization.or_else(|| doctor.map(|d| d.specialization));

    let appt = Appointment {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        clinician_id: clinician.id,
        visit_type,
        specialization,
        scheduled_at,
        status: AppointmentStatus::Scheduled,
        triage_notes,
        cost,
        cancellation_reason: None,
        created_at: now(),
        updated_at: None,
    };
    repository::insert_appointment(&conn, &appt)?;

    tracing::info!(
        appointment_id = %appt.id,
        patient_id = %appt.patient_id,
        clinician_id = %appt.clinician_id,
        booked_by = %caller.user_id,
        "Appointment booked"
    );
    Ok((StatusCode::CREATED, Json(appt)))
}

/// `GET /api/appointments?status=`: scoped to the caller's role.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| validation::enum_value::<AppointmentStatus>(s, "status", AppointmentStatus::ALL))
        .transpose()?;
    let scope = RecordScope::for_actor(&caller.actor());

    let conn = ctx.core.open_db()?;
    let appointments = repository::list_appointments(
        &conn,
        &repository::AppointmentFilter {
            patient_id: scope.patient_id(),
            clinician_id: scope.clinician_id(),
            status,
        },
    )?;
    Ok(Json(appointments))
}

/// `GET /api/appointments/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(&id, "appointment")?;
    let conn = ctx.core.open_db()?;
    Ok(Json(load_visible(&conn, &caller, &id)?))
}

/// `PUT /api/appointments/:id`: administrative edits.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(&id, "appointment")?;
    let conn = ctx.core.open_db()?;
    let mut appt = load_visible(&conn, &caller, &id)?;
    if !authorization::can_edit_appointment(&caller.actor(), &appt) {
        return Err(ApiError::forbidden("Only administrators can edit appointments"));
    }
    ensure_open(&appt)?;

    if let Some(v) = &req.visit_type {
        appt.visit_type = validation::required_text(v, "Visit type", 50)?;
    }
    if req.specialization.is_some() {
        appt.specialization =
            validation::optional_text(req.specialization.as_deref(), "Specialization", 100)?;
    }
    if req.triage_notes.is_some() {
        appt.triage_notes = validation::optional_text(req.triage_notes.as_deref(), "Triage notes", 2000)?;
    }
    if req.cost.is_some() {
        appt.cost = cost(req.cost)?;
    }
    if let Some(at) = &req.scheduled_at {
        if appt.status != AppointmentStatus::Scheduled {
            return Err(ApiError::bad_request("Only scheduled appointments can be rescheduled"));
        }
        appt.scheduled_at = future_datetime(at)?;
    }

    appt.updated_at = Some(now());
    repository::update_appointment(&conn, &appt)?;
    Ok(Json(appt))
}

/// `POST /api/appointments/:id/reschedule`
pub async fn reschedule(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(&id, "appointment")?;
    let conn = ctx.core.open_db()?;
    let mut appt = load_visible(&conn, &caller, &id)?;
    if appt.status != AppointmentStatus::Scheduled {
        return Err(ApiError::bad_request("Only scheduled appointments can be rescheduled"));
    }
    appt.scheduled_at = future_datetime(&req.scheduled_at)?;
    appt.updated_at = Some(now());
    repository::update_appointment(&conn, &appt)?;

    tracing::info!(appointment_id = %appt.id, by = %caller.user_id, "Appointment rescheduled");
    Ok(Json(appt))
}

fn apply_cancel(
    conn: &Connection,
    caller: &AuthUser,
    appt: &mut Appointment,
    reason: Option<&str>,
) -> Result<(), ApiError> {
    if !appt.status.can_transition_to(AppointmentStatus::Cancelled) {
        return Err(ApiError::bad_request(format!(
            "Cannot cancel a {} appointment",
            appt.status
        )));
    }
    appt.status = AppointmentStatus::Cancelled;
    appt.cancellation_reason = validation::optional_text(reason, "Cancellation reason", 500)?;
    appt.updated_at = Some(now());
    repository::update_appointment(conn, appt)?;
    tracing::info!(appointment_id = %appt.id, by = %caller.user_id, "Appointment cancelled");
    Ok(())
}

/// `POST /api/appointments/:id/cancel`: patients may cancel their own.
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(&id, "appointment")?;
    let conn = ctx.core.open_db()?;
    let mut appt = load_visible(&conn, &caller, &id)?;
    apply_cancel(&conn, &caller, &mut appt, req.reason.as_deref())?;
    Ok(Json(appt))
}

/// `PUT /api/appointments/:id/status`
pub async fn set_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(&id, "appointment")?;
    let next =
        validation::enum_value::<AppointmentStatus>(&req.status, "status", AppointmentStatus::ALL)?;
    let conn = ctx.core.open_db()?;
    let mut appt = load_visible(&conn, &caller, &id)?;
    if !authorization::can_set_appointment_status(&caller.actor(), &appt, next) {
        return Err(ApiError::forbidden("Not authorized to change this appointment's status"));
    }

    if next == AppointmentStatus::Cancelled {
        apply_cancel(&conn, &caller, &mut appt, req.reason.as_deref())?;
        return Ok(Json(appt));
    }
    if !appt.status.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot change status from {} to {}",
            appt.status, next
        )));
    }
    let previous = appt.status;
    appt.status = next;
    appt.updated_at = Some(now());
    repository::update_appointment(&conn, &appt)?;

    tracing::info!(appointment_id = %appt.id, from = %previous, to = %next, by = %caller.user_id, "Appointment status changed");
    Ok(Json(appt))
}
