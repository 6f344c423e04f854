//! Pharmacy inventory and the patient wishlist.
//!
//! Catalogue reads are public; writes need the pharmacist or super admin role.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser, MessageResponse};
use crate::api::validation;
use crate::db::{now, repository};
use crate::models::{Medication, Role, WishlistItem};

const INVENTORY_ROLES: &[Role] = &[Role::SuperAdmin, Role::Pharmacist];

#[derive(Debug, Deserialize)]
pub struct MedicationListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub in_stock: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMedicationRequest {
    pub name: String,
    pub category: String,
    pub dosage: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub prescription_required: bool,
    pub expiry_date: Option<String>,
    pub batch_number: Option<String>,
    pub supplier: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMedicationRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub dosage: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub description: Option<String>,
    pub prescription_required: Option<bool>,
    pub expiry_date: Option<String>,
    pub batch_number: Option<String>,
    pub supplier: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    pub medication_id: Uuid,
}

fn stock(value: i64) -> Result<i64, ApiError> {
    if value < 0 {
        return Err(ApiError::bad_request("Stock cannot be negative"));
    }
    Ok(value)
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// `GET /api/medications?category=&search=&in_stock=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<MedicationListQuery>,
) -> Result<Json<Vec<Medication>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let meds = repository::list_medications(
        &conn,
        &repository::MedicationFilter {
            category: non_blank(query.category),
            search: non_blank(query.search),
            in_stock: query.in_stock,
        },
    )?;
    Ok(Json(meds))
}

/// `GET /api/medications/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<Medication>, ApiError> {
    let id = parse_id(&id, "medication")?;
    let conn = ctx.core.open_db()?;
    let med = repository::get_medication(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Medication not found"))?;
    Ok(Json(med))
}

/// `POST /api/medications`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreateMedicationRequest>,
) -> Result<(StatusCode, Json<Medication>), ApiError> {
    caller.require(INVENTORY_ROLES)?;
    let stock = stock(req.stock)?;
    let med = Medication {
        id: Uuid::new_v4(),
        name: validation::required_text(&req.name, "Name", 200)?,
        category: validation::required_text(&req.category, "Category", 100)?,
        dosage: validation::optional_text(req.dosage.as_deref(), "Dosage", 100)?,
        price: validation::positive_amount(req.price, "Price")?,
        stock,
        description: validation::optional_text(req.description.as_deref(), "Description", 2000)?,
        prescription_required: req.prescription_required,
        expiry_date: validation::optional_date(req.expiry_date.as_deref(), "expiry date")?,
        batch_number: validation::optional_text(req.batch_number.as_deref(), "Batch number", 100)?,
        supplier: validation::optional_text(req.supplier.as_deref(), "Supplier", 200)?,
        image_url: validation::optional_text(req.image_url.as_deref(), "Image URL", 500)?,
        in_stock: stock > 0,
        created_at: now(),
        updated_at: None,
    };

    let conn = ctx.core.open_db()?;
    repository::insert_medication(&conn, &med)?;
    tracing::info!(medication_id = %med.id, by = %caller.user_id, "Medication added to inventory");
    Ok((StatusCode::CREATED, Json(med)))
}

/// `PUT /api/medications/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMedicationRequest>,
) -> Result<Json<Medication>, ApiError> {
    caller.require(INVENTORY_ROLES)?;
    let id = parse_id(&id, "medication")?;
    let conn = ctx.core.open_db()?;
    let mut med = repository::get_medication(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Medication not found"))?;

    if let Some(name) = &req.name {
        med.name = validation::required_text(name, "Name", 200)?;
    }
    if let Some(category) = &req.category {
        med.category = validation::required_text(category, "Category", 100)?;
    }
    if req.dosage.is_some() {
        med.dosage = validation::optional_text(req.dosage.as_deref(), "Dosage", 100)?;
    }
    if let Some(price) = req.price {
        med.price = validation::positive_amount(price, "Price")?;
    }
    if let Some(s) = req.stock {
        med.stock = stock(s)?;
    }
    if req.description.is_some() {
        med.description = validation::optional_text(req.description.as_deref(), "Description", 2000)?;
    }
    if let Some(required) = req.prescription_required {
        med.prescription_required = required;
    }
    if req.expiry_date.is_some() {
        med.expiry_date = validation::optional_date(req.expiry_date.as_deref(), "expiry date")?;
    }
    if req.batch_number.is_some() {
        med.batch_number = validation::optional_text(req.batch_number.as_deref(), "Batch number", 100)?;
    }
    if req.supplier.is_some() {
        med.supplier = validation::optional_text(req.supplier.as_deref(), "Supplier", 200)?;
    }
    if req.image_url.is_some() {
        med.image_url = validation::optional_text(req.image_url.as_deref(), "Image URL", 500)?;
    }

    repository::update_medication(&conn, &med)?;
    let med = repository::get_medication(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Medication not found"))?;
    Ok(Json(med))
}

/// `DELETE /api/medications/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(INVENTORY_ROLES)?;
    let id = parse_id(&id, "medication")?;
    let conn = ctx.core.open_db()?;
    if !repository::delete_medication(&conn, &id)? {
        return Err(ApiError::not_found("Medication not found"));
    }
    tracing::info!(medication_id = %id, by = %caller.user_id, "Medication removed from inventory");
    Ok(Json(MessageResponse::new("Medication deleted")))
}

// ── Wishlist ─────────────────────────────────────────────────

/// `GET /api/patient/wishlist`
pub async fn wishlist(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<WishlistItem>>, ApiError> {
    caller.require(&[Role::Patient])?;
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::list_wishlist(&conn, &caller.user_id)?))
}

/// `POST /api/patient/wishlist`
pub async fn add_to_wishlist(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<WishlistRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    caller.require(&[Role::Patient])?;
    let conn = ctx.core.open_db()?;
    if repository::get_medication(&conn, &req.medication_id)?.is_none() {
        return Err(ApiError::not_found("Medication not found"));
    }
    if repository::is_in_wishlist(&conn, &caller.user_id, &req.medication_id)? {
        return Err(ApiError::bad_request("Medication already in wishlist"));
    }
    repository::add_to_wishlist(&conn, &caller.user_id, &req.medication_id)?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Added to wishlist")),
    ))
}

/// `DELETE /api/patient/wishlist/:medication_id`
pub async fn remove_from_wishlist(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(medication_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(&[Role::Patient])?;
    let medication_id = parse_id(&medication_id, "medication")?;
    let conn = ctx.core.open_db()?;
    if !repository::remove_from_wishlist(&conn, &caller.user_id, &medication_id)? {
        return Err(ApiError::not_found("Medication not in wishlist"));
    }
    Ok(Json(MessageResponse::new("Removed from wishlist")))
}

/// `DELETE /api/patient/wishlist`
pub async fn clear_wishlist(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(&[Role::Patient])?;
    let conn = ctx.core.open_db()?;
    let removed = repository::clear_wishlist(&conn, &caller.user_id)?;
    Ok(Json(MessageResponse::new(format!(
        "Wishlist cleared ({removed} items)"
    ))))
}
