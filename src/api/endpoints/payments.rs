//! Payment intake stub. Rows are recorded as pending; no gateway is called.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser};
use crate::api::validation;
use crate::db::{now, repository};
use crate::models::{AppointmentStatus, Payment, PaymentMethod, PaymentStatus, Role};

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub appointment_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub card_number: Option<String>,
    pub phone_number: Option<String>,
    pub bank_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub amount: f64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentHistory {
    pub user_id: Uuid,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub status: String,
}

/// Only the last four digits of a card ever reach the database.
fn payment_details(method: PaymentMethod, req: &PaymentRequest) -> Result<serde_json::Value, ApiError> {
    match method {
        PaymentMethod::Card => {
            let digits: String = req
                .card_number
                .as_deref()
                .unwrap_or_default()
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect();
            if !(12..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(ApiError::bad_request("A valid card number is required"));
            }
            Ok(json!({ "card_last4": &digits[digits.len() - 4..] }))
        }
        PaymentMethod::Mpesa => {
            let phone = validation::optional_text(req.phone_number.as_deref(), "Phone number", 20)?
                .ok_or_else(|| ApiError::bad_request("Phone number is required for M-Pesa"))?;
            Ok(json!({ "phone_number": phone }))
        }
        PaymentMethod::BankTransfer => {
            let reference =
                validation::optional_text(req.bank_reference.as_deref(), "Bank reference", 100)?
                    .ok_or_else(|| ApiError::bad_request("Bank reference is required"))?;
            Ok(json!({ "bank_reference": reference }))
        }
    }
}

/// `POST /api/payments`: the appointment's patient pays for it.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let amount = validation::positive_amount(req.amount, "Amount")?;
    let method =
        validation::enum_value::<PaymentMethod>(&req.payment_method, "payment method", PaymentMethod::ALL)?;
    let details = payment_details(method, &req)?;

    let conn = ctx.core.open_db()?;
    let appointment = repository::get_appointment(&conn, &req.appointment_id)?
        .filter(|a| a.patient_id == caller.user_id)
        .ok_or_else(|| ApiError::not_found("Appointment not found or unauthorized"))?;
    if appointment.status == AppointmentStatus::Cancelled {
        return Err(ApiError::bad_request("Cannot pay for a cancelled appointment"));
    }

    let payment = Payment {
        id: Uuid::new_v4(),
        appointment_id: appointment.id,
        user_id: caller.user_id,
        amount,
        payment_method: method,
        transaction_id: Uuid::new_v4().to_string(),
        status: PaymentStatus::Pending,
        reference_number: None,
        payment_details: details,
        created_at: now(),
        updated_at: None,
    };
    repository::insert_payment(&conn, &payment)?;

    tracing::info!(
        payment_id = %payment.id,
        appointment_id = %appointment.id,
        method = %method,
        "Payment recorded"
    );
    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse {
            payment_id: payment.id,
            transaction_id: payment.transaction_id,
            status: payment.status,
            amount,
            message: "Payment processing initiated. Please check email for confirmation.".into(),
        }),
    ))
}

/// `GET /api/payments/history`
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<PaymentHistory>, ApiError> {
    let conn = ctx.core.open_db()?;
    let payments = repository::list_payments_for_user(&conn, &caller.user_id)?;
    Ok(Json(PaymentHistory {
        user_id: caller.user_id,
        payments,
    }))
}

/// `PUT /api/payments/:id/status`: manual settlement by a super admin.
pub async fn update_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<PaymentStatusRequest>,
) -> Result<Json<Payment>, ApiError> {
    caller.require(&[Role::SuperAdmin])?;
    let id = parse_id(&id, "payment")?;
    let status = validation::enum_value::<PaymentStatus>(&req.status, "status", PaymentStatus::ALL)?;

    let conn = ctx.core.open_db()?;
    let payment = repository::get_payment(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;
    if matches!(payment.status, PaymentStatus::Completed | PaymentStatus::Failed) {
        return Err(ApiError::bad_request(format!(
            "Payment is already {}",
            payment.status
        )));
    }
    repository::update_payment_status(&conn, &id, status)?;
    let payment = repository::get_payment(&conn, &id)?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;
    tracing::info!(payment_id = %id, status = %status, "Payment status updated");
    Ok(Json(payment))
}
