//! Self-service profile sections for doctors under `/api/doctor/profile`.
//!
//! Every handler resolves the caller's doctor row first; accounts without
//! one get 404.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::{log_activity, ClientInfo};
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser, MessageResponse};
use crate::api::validation;
use crate::db::{now, repository};
use crate::models::{
    Doctor, DoctorAvailability, DoctorContactInfo, DoctorEducation, DoctorSettings, EducationType,
    Weekday,
};

#[derive(Debug, Deserialize)]
pub struct EducationRequest {
    pub title: String,
    pub institution: String,
    pub year: i64,
    #[serde(alias = "type")]
    pub education_type: String,
    pub license_number: Option<String>,
    pub expiry_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub hospital: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub languages: Option<Vec<String>>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    /// Required for bulk updates; ignored when updating a row by id.
    pub day: Option<String>,
    pub is_open: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub break_start: Option<String>,
    pub break_end: Option<String>,
    pub appointment_duration: Option<i64>,
    pub buffer_time: Option<i64>,
    pub max_appointments_per_day: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CompleteProfile {
    pub doctor: Doctor,
    pub education: Vec<DoctorEducation>,
    pub contact_info: DoctorContactInfo,
    pub availability: Vec<DoctorAvailability>,
    pub settings: DoctorSettings,
}

fn own_doctor(conn: &rusqlite::Connection, caller: &AuthUser) -> Result<Doctor, ApiError> {
    repository::get_doctor_by_user(conn, &caller.user_id)?
        .ok_or_else(|| ApiError::not_found("Doctor profile not found"))
}

// ── Education ────────────────────────────────────────────────

fn education_fields(req: &EducationRequest, into: &mut DoctorEducation) -> Result<(), ApiError> {
    into.title = validation::required_text(&req.title, "Title", 200)?;
    into.institution = validation::required_text(&req.institution, "Institution", 200)?;
    into.year = validation::in_range(req.year, 1900, 2100, "Year")?;
    into.education_type =
        validation::enum_value::<EducationType>(&req.education_type, "type", EducationType::ALL)?;
    into.license_number =
        validation::optional_text(req.license_number.as_deref(), "License number", 50)?;
    into.expiry_date = validation::optional_date(req.expiry_date.as_deref(), "expiry date")?;
    Ok(())
}

fn load_own_education(
    conn: &rusqlite::Connection,
    doctor: &Doctor,
    id: &str,
) -> Result<DoctorEducation, ApiError> {
    let id = parse_id(id, "education")?;
    repository::get_education(conn, &id)?
        .filter(|e| e.doctor_id == doctor.id)
        .ok_or_else(|| ApiError::not_found("Education record not found"))
}

/// `GET /api/doctor/profile/education`: newest first.
pub async fn list_education(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<DoctorEducation>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    Ok(Json(repository::list_education(&conn, &doctor.id)?))
}

/// `POST /api/doctor/profile/education`
pub async fn add_education(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<EducationRequest>,
) -> Result<(StatusCode, Json<DoctorEducation>), ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    let mut edu = DoctorEducation {
        id: Uuid::new_v4(),
        doctor_id: doctor.id,
        title: String::new(),
        institution: String::new(),
        year: 0,
        education_type: EducationType::Degree,
        license_number: None,
        expiry_date: None,
        created_at: now(),
        updated_at: None,
    };
    education_fields(&req, &mut edu)?;
    repository::insert_education(&conn, &edu)?;
    Ok((StatusCode::CREATED, Json(edu)))
}

/// `PUT /api/doctor/profile/education/:id`
pub async fn update_education(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<EducationRequest>,
) -> Result<Json<DoctorEducation>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    let mut edu = load_own_education(&conn, &doctor, &id)?;
    education_fields(&req, &mut edu)?;
    edu.updated_at = Some(now());
    repository::update_education(&conn, &edu)?;
    Ok(Json(edu))
}

/// `DELETE /api/doctor/profile/education/:id`
pub async fn delete_education(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    let edu = load_own_education(&conn, &doctor, &id)?;
    repository::delete_education(&conn, &edu.id)?;
    Ok(Json(MessageResponse::new("Education record deleted")))
}

// ── Contact info ─────────────────────────────────────────────

/// `GET /api/doctor/profile/contact`: created with defaults on first read.
pub async fn get_contact(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<DoctorContactInfo>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    Ok(Json(repository::get_or_create_contact_info(&conn, &doctor.id)?))
}

/// `PUT /api/doctor/profile/contact`: the fee is mirrored onto the doctor row
/// so new bookings pick it up.
pub async fn put_contact(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<ContactRequest>,
) -> Result<Json<DoctorContactInfo>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut doctor = own_doctor(&conn, &caller)?;
    let mut info = repository::get_or_create_contact_info(&conn, &doctor.id)?;

    if req.hospital.is_some() {
        info.hospital = validation::optional_text(req.hospital.as_deref(), "Hospital", 200)?;
    }
    if req.department.is_some() {
        info.department = validation::optional_text(req.department.as_deref(), "Department", 200)?;
    }
    if req.location.is_some() {
        info.location = validation::optional_text(req.location.as_deref(), "Location", 200)?;
    }
    if let Some(languages) = req.languages {
        info.languages = languages
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| validation::required_text(l, "Language", 50))
            .collect::<Result<_, _>>()?;
    }
    if let Some(fee) = req.consultation_fee {
        if !fee.is_finite() || fee < 0.0 {
            return Err(ApiError::bad_request("Consultation fee cannot be negative"));
        }
        info.consultation_fee = Some(fee);
        doctor.consultation_fee = Some(fee);
    }

    let tx = conn.unchecked_transaction()?;
    repository::upsert_contact_info(&tx, &doctor.id, &info)?;
    if req.consultation_fee.is_some() {
        doctor.updated_at = Some(now());
        repository::update_doctor(&tx, &doctor)?;
    }
    tx.commit()?;
    Ok(Json(info))
}

// ── Availability ─────────────────────────────────────────────

/// Apply a request onto an existing row after checking the clock values.
fn apply_availability(
    req: &AvailabilityRequest,
    slot: &mut DoctorAvailability,
) -> Result<(), ApiError> {
    let start = validation::clock_time(req.start_time.as_deref(), "start_time")?;
    let end = validation::clock_time(req.end_time.as_deref(), "end_time")?;
    let break_start = validation::clock_time(req.break_start.as_deref(), "break_start")?;
    let break_end = validation::clock_time(req.break_end.as_deref(), "break_end")?;

    if req.is_open {
        match (&start, &end) {
            (Some(s), Some(e)) if s < e => {}
            (Some(_), Some(_)) => {
                return Err(ApiError::bad_request("start_time must be before end_time"))
            }
            _ => {
                return Err(ApiError::bad_request(
                    "Open days need both start_time and end_time",
                ))
            }
        }
        if let (Some(bs), Some(be)) = (&break_start, &break_end) {
            if bs >= be {
                return Err(ApiError::bad_request("break_start must be before break_end"));
            }
        }
    }

    slot.is_open = req.is_open;
    slot.start_time = start;
    slot.end_time = end;
    slot.break_start = break_start;
    slot.break_end = break_end;
    if let Some(d) = req.appointment_duration {
        slot.appointment_duration = validation::in_range(d, 5, 240, "appointment_duration")?;
    }
    if let Some(b) = req.buffer_time {
        slot.buffer_time = validation::in_range(b, 0, 120, "buffer_time")?;
    }
    if let Some(m) = req.max_appointments_per_day {
        slot.max_appointments_per_day = validation::in_range(m, 1, 100, "max_appointments_per_day")?;
    }
    Ok(())
}

/// `GET /api/doctor/profile/availability`: Monday through Sunday.
pub async fn get_availability(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<DoctorAvailability>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    Ok(Json(repository::list_or_seed_availability(&conn, &doctor.id)?))
}

/// `PUT /api/doctor/profile/availability/:id`
pub async fn update_availability(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<DoctorAvailability>, ApiError> {
    let id = parse_id(&id, "availability")?;
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    let mut slot = repository::get_availability(&conn, &id)?
        .filter(|a| a.doctor_id == doctor.id)
        .ok_or_else(|| ApiError::not_found("Availability record not found"))?;

    apply_availability(&req, &mut slot)?;
    repository::upsert_availability(&conn, &slot)?;
    log_activity(&conn, caller.user_id, "Updated Availability Schedule", &client);
    Ok(Json(slot))
}

/// `PUT|POST /api/doctor/profile/availability/bulk`: upsert by day.
pub async fn bulk_availability(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    client: ClientInfo,
    Json(items): Json<Vec<AvailabilityRequest>>,
) -> Result<Json<Vec<DoctorAvailability>>, ApiError> {
    if items.is_empty() {
        return Err(ApiError::bad_request("At least one day is required"));
    }
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    let week = repository::list_or_seed_availability(&conn, &doctor.id)?;

    let mut updated = Vec::with_capacity(items.len());
    for req in &items {
        let raw_day = req
            .day
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("Each entry needs a day"))?;
        let day = validation::enum_value::<Weekday>(raw_day, "day", Weekday::ALL)?;
        let mut slot = week
            .iter()
            .find(|s| s.day == day)
            .cloned()
            .unwrap_or_else(|| DoctorAvailability::default_for(doctor.id, day));
        apply_availability(req, &mut slot)?;
        updated.push(slot);
    }

    let tx = conn.unchecked_transaction()?;
    for slot in &updated {
        repository::upsert_availability(&tx, slot)?;
    }
    tx.commit()?;
    log_activity(&conn, caller.user_id, "Updated Availability Schedule (Bulk)", &client);
    Ok(Json(updated))
}

// ── Settings ─────────────────────────────────────────────────

/// `GET /api/doctor/profile/settings`
pub async fn get_settings(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<DoctorSettings>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    Ok(Json(repository::get_or_create_settings(&conn, &doctor.id)?))
}

/// `PUT /api/doctor/profile/settings`
pub async fn put_settings(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    client: ClientInfo,
    Json(req): Json<DoctorSettings>,
) -> Result<Json<DoctorSettings>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    repository::upsert_settings(&conn, &doctor.id, &req)?;
    log_activity(&conn, caller.user_id, "Updated Profile Settings", &client);
    Ok(Json(req))
}

/// `GET /api/doctor/profile/complete`: every section, defaults filled in.
pub async fn complete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<CompleteProfile>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctor = own_doctor(&conn, &caller)?;
    let education = repository::list_education(&conn, &doctor.id)?;
    let contact_info = repository::get_or_create_contact_info(&conn, &doctor.id)?;
    let availability = repository::list_or_seed_availability(&conn, &doctor.id)?;
    let settings = repository::get_or_create_settings(&conn, &doctor.id)?;
    Ok(Json(CompleteProfile {
        doctor,
        education,
        contact_info,
        availability,
        settings,
    }))
}
