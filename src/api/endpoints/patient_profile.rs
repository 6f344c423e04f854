//! Per-user profile sections under `/api/patient`, addresses, the activity
//! log, and clinician-recorded medical history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::endpoints::{log_activity, ClientInfo};
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser, LimitQuery, MessageResponse};
use crate::api::validation;
use crate::db::{now, repository};
use crate::models::{
    ActivityLog, Address, EmergencyContact, Insurance, MedicalHistoryEntry, MedicalInfo,
    NotificationSettings, Role, SecuritySettings,
};

const BLOOD_TYPES: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub address: String,
    pub additional_info: Option<String>,
    pub region: String,
    pub city: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct MedicalHistoryRequest {
    pub appointment_id: Option<Uuid>,
    pub diagnosis: Option<String>,
    pub symptoms: Option<String>,
    pub treatment_plan: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

fn text_list(items: Vec<String>, field: &str) -> Result<Vec<String>, ApiError> {
    items
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| validation::required_text(s, field, 200))
        .collect()
}

fn measurement(value: Option<f64>, field: &str) -> Result<Option<f64>, ApiError> {
    value
        .map(|v| validation::positive_amount(v, field))
        .transpose()
}

// ── Medical info ─────────────────────────────────────────────

/// `GET /api/patient/medical-info`: empty sections until first saved.
pub async fn get_medical_info(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<MedicalInfo>, ApiError> {
    let conn = ctx.core.open_db()?;
    let info = repository::get_medical_info(&conn, &caller.user_id)?.unwrap_or_default();
    Ok(Json(info))
}

/// `PUT /api/patient/medical-info`
pub async fn put_medical_info(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<MedicalInfo>,
) -> Result<Json<MedicalInfo>, ApiError> {
    let blood_type = match req.blood_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(bt) => {
            let bt = bt.to_uppercase();
            if !BLOOD_TYPES.contains(&bt.as_str()) {
                return Err(ApiError::bad_request(format!(
                    "Invalid blood type. Must be one of: {}",
                    BLOOD_TYPES.join(", ")
                )));
            }
            Some(bt)
        }
        None => None,
    };
    let info = MedicalInfo {
        blood_type,
        height: measurement(req.height, "Height")?,
        weight: measurement(req.weight, "Weight")?,
        allergies: text_list(req.allergies, "Allergy")?,
        conditions: text_list(req.conditions, "Condition")?,
        medications: text_list(req.medications, "Medication")?,
    };

    let conn = ctx.core.open_db()?;
    repository::upsert_medical_info(&conn, &caller.user_id, &info)?;
    Ok(Json(info))
}

// ── Emergency contact & insurance ────────────────────────────

/// `GET /api/patient/emergency-contact`: `null` until saved.
pub async fn get_emergency_contact(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Option<EmergencyContact>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::get_emergency_contact(&conn, &caller.user_id)?))
}

/// `PUT /api/patient/emergency-contact`
pub async fn put_emergency_contact(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<EmergencyContact>,
) -> Result<Json<EmergencyContact>, ApiError> {
    let contact = EmergencyContact {
        name: validation::required_text(&req.name, "Name", 120)?,
        phone: validation::required_text(&req.phone, "Phone", 20)?,
        relation: validation::required_text(&req.relation, "Relation", 50)?,
    };
    let conn = ctx.core.open_db()?;
    repository::upsert_emergency_contact(&conn, &caller.user_id, &contact)?;
    Ok(Json(contact))
}

/// `GET /api/patient/insurance`: `null` until saved.
pub async fn get_insurance(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Option<Insurance>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::get_insurance(&conn, &caller.user_id)?))
}

/// `PUT /api/patient/insurance`
pub async fn put_insurance(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<Insurance>,
) -> Result<Json<Insurance>, ApiError> {
    let insurance = Insurance {
        provider: validation::required_text(&req.provider, "Provider", 120)?,
        policy_number: validation::required_text(&req.policy_number, "Policy number", 60)?,
        group_number: validation::optional_text(req.group_number.as_deref(), "Group number", 60)?,
        holder_name: validation::required_text(&req.holder_name, "Holder name", 120)?,
    };
    let conn = ctx.core.open_db()?;
    repository::upsert_insurance(&conn, &caller.user_id, &insurance)?;
    Ok(Json(insurance))
}

// ── Settings ─────────────────────────────────────────────────

/// `GET /api/patient/notification-settings`
pub async fn get_notification_settings(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<NotificationSettings>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::get_notification_settings(&conn, &caller.user_id)?))
}

/// `PUT /api/patient/notification-settings`
pub async fn put_notification_settings(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<NotificationSettings>,
) -> Result<Json<NotificationSettings>, ApiError> {
    let conn = ctx.core.open_db()?;
    repository::upsert_notification_settings(&conn, &caller.user_id, &req)?;
    Ok(Json(req))
}

/// `GET /api/patient/security-settings`
pub async fn get_security_settings(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<SecuritySettings>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::get_security_settings(&conn, &caller.user_id)?))
}

/// `PUT /api/patient/security-settings`
pub async fn put_security_settings(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    client: ClientInfo,
    Json(req): Json<SecuritySettings>,
) -> Result<Json<SecuritySettings>, ApiError> {
    let conn = ctx.core.open_db()?;
    let before = repository::get_security_settings(&conn, &caller.user_id)?;
    repository::upsert_security_settings(&conn, &caller.user_id, &req)?;
    if before != req {
        log_activity(&conn, caller.user_id, "Security settings updated", &client);
    }
    Ok(Json(req))
}

/// `GET /api/patient/activity?limit=`
pub async fn activity(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(limit): Query<LimitQuery>,
) -> Result<Json<Vec<ActivityLog>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let entries = repository::list_activity(&conn, &caller.user_id, limit.resolve(20, 100))?;
    Ok(Json(entries))
}

// ── Addresses ────────────────────────────────────────────────

fn address_fields(req: &AddressRequest, into: &mut Address) -> Result<(), ApiError> {
    into.first_name = validation::required_text(&req.first_name, "First name", 60)?;
    into.last_name = validation::required_text(&req.last_name, "Last name", 60)?;
    into.phone_number = validation::required_text(&req.phone_number, "Phone number", 20)?;
    into.address = validation::required_text(&req.address, "Address", 255)?;
    into.additional_info =
        validation::optional_text(req.additional_info.as_deref(), "Additional info", 255)?;
    into.region = validation::required_text(&req.region, "Region", 100)?;
    into.city = validation::required_text(&req.city, "City", 100)?;
    Ok(())
}

fn load_own_address(
    conn: &rusqlite::Connection,
    caller: &AuthUser,
    id: &str,
) -> Result<Address, ApiError> {
    let id = parse_id(id, "address")?;
    repository::get_address(conn, &id)?
        .filter(|a| a.user_id == caller.user_id)
        .ok_or_else(|| ApiError::not_found("Address not found"))
}

/// `GET /api/patient/addresses`: default first.
pub async fn list_addresses(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<Address>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::list_addresses(&conn, &caller.user_id)?))
}

/// `POST /api/patient/addresses`: the first address becomes the default.
pub async fn create_address(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<AddressRequest>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    let mut address = Address {
        id: Uuid::new_v4(),
        user_id: caller.user_id,
        first_name: String::new(),
        last_name: String::new(),
        phone_number: String::new(),
        address: String::new(),
        additional_info: None,
        region: String::new(),
        city: String::new(),
        is_default: req.is_default,
        created_at: now(),
        updated_at: None,
    };
    address_fields(&req, &mut address)?;

    let conn = ctx.core.open_db()?;
    let stored = repository::insert_address(&conn, &address)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// `PUT /api/patient/addresses/:id`
pub async fn update_address(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<AddressRequest>,
) -> Result<Json<Address>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut address = load_own_address(&conn, &caller, &id)?;
    address_fields(&req, &mut address)?;
    // The default can be moved here but not cleared; it always lives somewhere.
    address.is_default = address.is_default || req.is_default;
    repository::update_address(&conn, &address)?;
    let address = load_own_address(&conn, &caller, &id)?;
    Ok(Json(address))
}

/// `POST /api/patient/addresses/:id/default`
pub async fn set_default_address(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Address>, ApiError> {
    let conn = ctx.core.open_db()?;
    let address = load_own_address(&conn, &caller, &id)?;
    repository::set_default_address(&conn, &caller.user_id, &address.id)?;
    let address = load_own_address(&conn, &caller, &id)?;
    Ok(Json(address))
}

/// `DELETE /api/patient/addresses/:id`: promotes the newest remaining address
/// when the default is removed.
pub async fn delete_address(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let address = load_own_address(&conn, &caller, &id)?;
    repository::delete_address(&conn, &address.id)?;
    if address.is_default {
        if let Some(next) = repository::list_addresses(&conn, &caller.user_id)?.first() {
            repository::set_default_address(&conn, &caller.user_id, &next.id)?;
        }
    }
    Ok(Json(MessageResponse::new("Address deleted")))
}

// ── Medical history ──────────────────────────────────────────

fn require_patient(conn: &rusqlite::Connection, id: &str) -> Result<Uuid, ApiError> {
    let id = parse_id(id, "patient")?;
    match repository::get_user(conn, &id)? {
        Some(user) if user.role == Role::Patient => Ok(user.id),
        _ => Err(ApiError::not_found("Patient not found")),
    }
}

/// `GET /api/patients/:id/medical-history`: the patient, or any staff member.
pub async fn medical_history(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MedicalHistoryEntry>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let patient_id = require_patient(&conn, &id)?;
    if patient_id != caller.user_id && !caller.role.is_staff() {
        return Err(ApiError::forbidden("Not authorized to view this medical history"));
    }
    Ok(Json(repository::list_medical_history(&conn, &patient_id)?))
}

/// `POST /api/patients/:id/medical-history`: clinicians and the super admin.
pub async fn add_medical_history(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<MedicalHistoryRequest>,
) -> Result<(StatusCode, Json<MedicalHistoryEntry>), ApiError> {
    if !caller.role.is_clinician() && caller.role != Role::SuperAdmin {
        return Err(ApiError::forbidden("Only clinicians can record medical history"));
    }
    let conn = ctx.core.open_db()?;
    let patient_id = require_patient(&conn, &id)?;
    if let Some(appointment_id) = req.appointment_id {
        let appt = repository::get_appointment(&conn, &appointment_id)?
            .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
        if appt.patient_id != patient_id {
            return Err(ApiError::bad_request("Appointment belongs to another patient"));
        }
    }

    let entry = MedicalHistoryEntry {
        id: Uuid::new_v4(),
        patient_id,
        appointment_id: req.appointment_id,
        recorded_by: Some(caller.user_id),
        diagnosis: validation::optional_text(req.diagnosis.as_deref(), "Diagnosis", 2000)?,
        symptoms: validation::optional_text(req.symptoms.as_deref(), "Symptoms", 2000)?,
        treatment_plan: validation::optional_text(req.treatment_plan.as_deref(), "Treatment plan", 2000)?,
        notes: validation::optional_text(req.notes.as_deref(), "Notes", 5000)?,
        attachments: text_list(req.attachments, "Attachment")?,
        created_at: now(),
    };
    if entry.diagnosis.is_none()
        && entry.symptoms.is_none()
        && entry.treatment_plan.is_none()
        && entry.notes.is_none()
    {
        return Err(ApiError::bad_request("Medical history entry cannot be empty"));
    }

    repository::insert_medical_history(&conn, &entry)?;
    tracing::info!(entry_id = %entry.id, %patient_id, by = %caller.user_id, "Medical history recorded");
    Ok((StatusCode::CREATED, Json(entry)))
}
