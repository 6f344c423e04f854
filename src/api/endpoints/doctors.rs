//! Doctor directory. Listing and detail are public.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser};
use crate::api::validation;
use crate::db::{now, repository};
use crate::models::{Doctor, DoctorListing, Role};

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub specialization: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub user_id: Uuid,
    pub specialization: String,
    pub bio: Option<String>,
    pub license_number: Option<String>,
    pub consultation_fee: Option<f64>,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoctorRequest {
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub license_number: Option<String>,
    pub consultation_fee: Option<f64>,
    pub is_available: Option<bool>,
}

fn fee(raw: Option<f64>) -> Result<Option<f64>, ApiError> {
    match raw {
        Some(f) if !f.is_finite() || f < 0.0 => {
            Err(ApiError::bad_request("Consultation fee cannot be negative"))
        }
        other => Ok(other),
    }
}

/// `GET /api/doctors?specialization=&is_available=`: available doctors by default.
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Vec<DoctorListing>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctors = repository::list_doctors(
        &conn,
        &repository::DoctorFilter {
            specialization: query
                .specialization
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            is_available: Some(query.is_available.unwrap_or(true)),
        },
    )?;
    Ok(Json(doctors))
}

/// `GET /api/doctors/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<DoctorListing>, ApiError> {
    let id = parse_id(&id, "doctor")?;
    let conn = ctx.core.open_db()?;
    let doctor = repository::get_doctor_listing(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;
    Ok(Json(doctor))
}

/// `POST /api/doctors`: attach a doctor profile to an existing doctor account.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Doctor>), ApiError> {
    caller.require(&[Role::SuperAdmin])?;
    let specialization = validation::required_text(&req.specialization, "Specialization", 100)?;
    let license_number = validation::optional_text(req.license_number.as_deref(), "License number", 50)?;
    let bio = validation::optional_text(req.bio.as_deref(), "Bio", 2000)?;
    let consultation_fee = fee(req.consultation_fee)?;

    let conn = ctx.core.open_db()?;
    let user = repository::get_user(&conn, &req.user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if user.role != Role::Doctor {
        return Err(ApiError::bad_request("User must have the doctor role"));
    }
    if repository::get_doctor_by_user(&conn, &user.id)?.is_some() {
        return Err(ApiError::bad_request("Doctor profile already exists for this user"));
    }
    if let Some(license) = &license_number {
        if repository::license_number_taken(&conn, license)? {
            return Err(ApiError::bad_request("License number already registered"));
        }
    }

    let doctor = Doctor {
        id: Uuid::new_v4(),
        user_id: user.id,
        specialization,
        bio,
        rating: 0.0,
        license_number,
        is_available: req.is_available,
        consultation_fee,
        created_at: now(),
        updated_at: None,
    };
    repository::insert_doctor(&conn, &doctor)?;

    tracing::info!(doctor_id = %doctor.id, user_id = %user.id, "Doctor profile created");
    Ok((StatusCode::CREATED, Json(doctor)))
}

/// `PUT /api/doctors/:id`: super admin or the doctor themself.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDoctorRequest>,
) -> Result<Json<Doctor>, ApiError> {
    let id = parse_id(&id, "doctor")?;
    let conn = ctx.core.open_db()?;
    let mut doctor = repository::get_doctor(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;
    if caller.role != Role::SuperAdmin && doctor.user_id != caller.user_id {
        return Err(ApiError::forbidden("Not authorized to update this doctor"));
    }

    if let Some(s) = &req.specialization {
        doctor.specialization = validation::required_text(s, "Specialization", 100)?;
    }
    if req.bio.is_some() {
        doctor.bio = validation::optional_text(req.bio.as_deref(), "Bio", 2000)?;
    }
    if req.license_number.is_some() {
        let license = validation::optional_text(req.license_number.as_deref(), "License number", 50)?;
        if let Some(l) = &license {
            if doctor.license_number.as_deref() != Some(l.as_str())
                && repository::license_number_taken(&conn, l)?
            {
                return Err(ApiError::bad_request("License number already registered"));
            }
        }
        doctor.license_number = license;
    }
    if req.consultation_fee.is_some() {
        doctor.consultation_fee = fee(req.consultation_fee)?;
    }
    if let Some(available) = req.is_available {
        doctor.is_available = available;
    }
    doctor.updated_at = Some(now());
    repository::update_doctor(&conn, &doctor)?;
    Ok(Json(doctor))
}
