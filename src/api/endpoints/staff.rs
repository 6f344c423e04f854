//! Staff directory and configurable staff role records.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::api::validation;
use crate::db::{now, repository};
use crate::models::{Role, StaffMember, StaffRole};

#[derive(Debug, Deserialize)]
pub struct StaffListQuery {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StaffRoleListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateStaffRoleRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub requires_specialization: bool,
    #[serde(default)]
    pub requires_license: bool,
    pub default_consultation_fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStaffRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub requires_specialization: Option<bool>,
    pub requires_license: Option<bool>,
    pub default_consultation_fee: Option<f64>,
}

fn permissions(raw: Vec<String>) -> Result<Vec<String>, ApiError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for p in raw {
        let p = validation::required_text(&p, "Permission", 64)?;
        if !out.contains(&p) {
            out.push(p);
        }
    }
    Ok(out)
}

fn role_fee(raw: Option<f64>) -> Result<Option<f64>, ApiError> {
    match raw {
        Some(f) if !f.is_finite() || f < 0.0 => {
            Err(ApiError::bad_request("Default consultation fee cannot be negative"))
        }
        other => Ok(other),
    }
}

/// `GET /api/staff?role=`: every non-patient account.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<StaffListQuery>,
) -> Result<Json<Vec<StaffMember>>, ApiError> {
    caller.require_admin()?;
    let role = query
        .role
        .as_deref()
        .map(|r| validation::enum_value::<Role>(r, "role", Role::ALL))
        .transpose()?;
    if role == Some(Role::Patient) {
        return Err(ApiError::bad_request("Patients are not staff"));
    }
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::list_staff(&conn, role)?))
}

/// `GET /api/staff-roles`
pub async fn list_roles(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<StaffRoleListQuery>,
) -> Result<Json<Vec<StaffRole>>, ApiError> {
    caller.require_admin()?;
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::list_staff_roles(&conn, query.active_only)?))
}

/// `POST /api/staff-roles`
pub async fn create_role(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreateStaffRoleRequest>,
) -> Result<(StatusCode, Json<StaffRole>), ApiError> {
    caller.require(&[Role::SuperAdmin])?;
    let name = validation::required_text(&req.name, "Name", 100)?;
    let description = validation::optional_text(req.description.as_deref(), "Description", 500)?;
    let permissions = permissions(req.permissions)?;
    let default_consultation_fee = role_fee(req.default_consultation_fee)?;

    let conn = ctx.core.open_db()?;
    if repository::get_staff_role_by_name(&conn, &name)?.is_some() {
        return Err(ApiError::bad_request("Staff role with this name already exists"));
    }

    let role = StaffRole {
        id: format!("role_{}", Uuid::new_v4().simple()),
        name,
        description,
        permissions,
        is_active: true,
        requires_specialization: req.requires_specialization,
        requires_license: req.requires_license,
        default_consultation_fee,
        created_at: now(),
        updated_at: None,
    };
    repository::insert_staff_role(&conn, &role)?;
    tracing::info!(staff_role = %role.id, "Staff role created");
    Ok((StatusCode::CREATED, Json(role)))
}

/// `PUT /api/staff-roles/:id`
pub async fn update_role(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStaffRoleRequest>,
) -> Result<Json<StaffRole>, ApiError> {
    caller.require(&[Role::SuperAdmin])?;
    let conn = ctx.core.open_db()?;
    let mut role = repository::get_staff_role(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Staff role not found"))?;

    if let Some(name) = &req.name {
        let name = validation::required_text(name, "Name", 100)?;
        if name != role.name {
            if let Some(existing) = repository::get_staff_role_by_name(&conn, &name)? {
                if existing.id != role.id {
                    return Err(ApiError::bad_request("Staff role with this name already exists"));
                }
            }
        }
        role.name = name;
    }
    if req.description.is_some() {
        role.description = validation::optional_text(req.description.as_deref(), "Description", 500)?;
    }
    if let Some(p) = req.permissions {
        role.permissions = permissions(p)?;
    }
    if let Some(active) = req.is_active {
        role.is_active = active;
    }
    if let Some(v) = req.requires_specialization {
        role.requires_specialization = v;
    }
    if let Some(v) = req.requires_license {
        role.requires_license = v;
    }
    if req.default_consultation_fee.is_some() {
        role.default_consultation_fee = role_fee(req.default_consultation_fee)?;
    }

    repository::update_staff_role(&conn, &role)?;
    let role = repository::get_staff_role(&conn, &role.id)?
        .ok_or_else(|| ApiError::not_found("Staff role not found"))?;
    Ok(Json(role))
}
