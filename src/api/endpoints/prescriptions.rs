//! Prescriptions issued against appointments.
//!
//! At most one per appointment. Status only moves forward:
//! pending → approved → fulfilled.

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::endpoints::appointments::load_visible;
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser};
use crate::api::validation;
use crate::authorization::{self, RecordScope};
use crate::core_state::CoreState;
use crate::db::{now, repository};
use crate::documents::{self, PrescriptionSheet};
use crate::models::{AppointmentStatus, PrescribedMedication, Prescription, PrescriptionStatus, Role};

#[derive(Debug, Deserialize)]
pub struct MedicationLine {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub appointment_id: Uuid,
    pub pharmacy_name: Option<String>,
    pub medications: Vec<MedicationLine>,
    pub expiry_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePrescriptionRequest {
    pub pharmacy_name: Option<String>,
    pub medications: Option<Vec<MedicationLine>>,
    pub expiry_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
}

fn medication_lines(lines: &[MedicationLine]) -> Result<Vec<PrescribedMedication>, ApiError> {
    if lines.is_empty() {
        return Err(ApiError::bad_request("At least one medication is required"));
    }
    lines
        .iter()
        .map(|line| {
            Ok(PrescribedMedication {
                name: validation::required_text(&line.name, "Medication name", 200)?,
                dosage: validation::required_text(&line.dosage, "Dosage", 100)?,
                frequency: validation::required_text(&line.frequency, "Frequency", 100)?,
                duration: validation::optional_text(line.duration.as_deref(), "Duration", 100)?,
                instructions: validation::optional_text(line.instructions.as_deref(), "Instructions", 500)?,
            })
        })
        .collect()
}

fn expiry_date(raw: Option<&str>) -> Result<Option<chrono::NaiveDate>, ApiError> {
    let expiry = validation::optional_date(raw, "expiry date")?;
    if expiry.is_some_and(|d| d < now().date()) {
        return Err(ApiError::bad_request("Expiry date cannot be in the past"));
    }
    Ok(expiry)
}

/// Load a prescription through its appointment's access rules.
fn load_visible_prescription(
    conn: &Connection,
    caller: &AuthUser,
    id: &Uuid,
) -> Result<(Prescription, crate::models::Appointment), ApiError> {
    let rx = repository::get_prescription(conn, id)?
        .ok_or_else(|| ApiError::not_found("Prescription not found"))?;
    let appt = repository::get_appointment(conn, &rx.appointment_id)?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    if !authorization::check_appointment_access(&caller.actor(), &appt).allowed {
        return Err(ApiError::forbidden("Not authorized to access this prescription"));
    }
    Ok((rx, appt))
}

/// `POST /api/prescriptions`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    let medications = medication_lines(&req.medications)?;
    let pharmacy_name = validation::optional_text(req.pharmacy_name.as_deref(), "Pharmacy name", 200)?;
    let expiry_date = expiry_date(req.expiry_date.as_deref())?;

    let conn = ctx.core.open_db()?;
    let appt = load_visible(&conn, &caller, &req.appointment_id)?;
    if !authorization::can_prescribe(&caller.actor(), &appt) {
        return Err(ApiError::forbidden(
            "Only the assigned doctor or an administrator can prescribe",
        ));
    }
    if appt.status == AppointmentStatus::Cancelled {
        return Err(ApiError::bad_request("Cannot prescribe for a cancelled appointment"));
    }
    if repository::get_prescription_by_appointment(&conn, &appt.id)?.is_some() {
        return Err(ApiError::Conflict(
            "Prescription already exists for this appointment".into(),
        ));
    }

    let issued = now();
    let rx = Prescription {
        id: Uuid::new_v4(),
        appointment_id: appt.id,
        issued_by_doctor_id: caller.user_id,
        pharmacy_name,
        medications,
        status: PrescriptionStatus::Pending,
        issued_date: issued,
        expiry_date,
        verified: false,
        created_at: issued,
        updated_at: None,
    };
    repository::insert_prescription(&conn, &rx)?;

    tracing::info!(prescription_id = %rx.id, appointment_id = %appt.id, by = %caller.user_id, "Prescription issued");
    Ok((StatusCode::CREATED, Json(rx)))
}

/// `GET /api/prescriptions?status=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<PrescriptionListQuery>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| validation::enum_value::<PrescriptionStatus>(s, "status", PrescriptionStatus::ALL))
        .transpose()?;
    let scope = RecordScope::for_actor(&caller.actor());

    let conn = ctx.core.open_db()?;
    let prescriptions = repository::list_prescriptions(
        &conn,
        &repository::PrescriptionFilter {
            patient_id: scope.patient_id(),
            clinician_id: scope.clinician_id(),
            status,
        },
    )?;
    Ok(Json(prescriptions))
}

/// `GET /api/prescriptions/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Prescription>, ApiError> {
    let id = parse_id(&id, "prescription")?;
    let conn = ctx.core.open_db()?;
    let (rx, _) = load_visible_prescription(&conn, &caller, &id)?;
    Ok(Json(rx))
}

/// `PUT /api/prescriptions/:id`: the prescriber or an admin, while pending.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePrescriptionRequest>,
) -> Result<Json<Prescription>, ApiError> {
    let id = parse_id(&id, "prescription")?;
    let conn = ctx.core.open_db()?;
    let (mut rx, _) = load_visible_prescription(&conn, &caller, &id)?;
    if rx.issued_by_doctor_id != caller.user_id && !caller.role.is_admin() {
        return Err(ApiError::forbidden(
            "Only the prescriber or an administrator can edit a prescription",
        ));
    }
    if rx.status != PrescriptionStatus::Pending {
        return Err(ApiError::bad_request("Only pending prescriptions can be edited"));
    }

    if req.pharmacy_name.is_some() {
        rx.pharmacy_name = validation::optional_text(req.pharmacy_name.as_deref(), "Pharmacy name", 200)?;
    }
    if let Some(lines) = &req.medications {
        rx.medications = medication_lines(lines)?;
    }
    if req.expiry_date.is_some() {
        rx.expiry_date = expiry_date(req.expiry_date.as_deref())?;
    }
    rx.updated_at = Some(now());
    repository::update_prescription(&conn, &rx)?;
    Ok(Json(rx))
}

/// `PUT /api/prescriptions/:id/status`: one step forward at a time.
pub async fn transition(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Prescription>, ApiError> {
    let id = parse_id(&id, "prescription")?;
    let next = validation::enum_value::<PrescriptionStatus>(
        &req.status,
        "status",
        PrescriptionStatus::ALL,
    )?;
    let conn = ctx.core.open_db()?;
    let (mut rx, _) = load_visible_prescription(&conn, &caller, &id)?;

    if rx.status.next() != Some(next) {
        return Err(ApiError::bad_request(format!(
            "Invalid status transition from {} to {}",
            rx.status, next
        )));
    }
    if !authorization::can_move_prescription(&caller.actor(), next) {
        return Err(ApiError::forbidden(format!(
            "Not authorized to mark a prescription {next}"
        )));
    }

    let previous = rx.status;
    rx.status = next;
    if next == PrescriptionStatus::Approved {
        rx.verified = true;
    }
    rx.updated_at = Some(now());
    repository::update_prescription(&conn, &rx)?;

    tracing::info!(prescription_id = %rx.id, from = %previous, to = %next, by = %caller.user_id, "Prescription status changed");
    Ok(Json(rx))
}

/// `GET /api/prescriptions/:id/qr`: SVG linking to the prescription.
pub async fn qr_code(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "prescription")?;
    let conn = ctx.core.open_db()?;
    let (rx, _) = load_visible_prescription(&conn, &caller, &id)?;
    let svg = documents::generate_qr_svg(&documents::prescription_link(ctx.core.frontend_url(), &rx))?;
    Ok(([(CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

/// `GET /api/prescriptions/:id/pdf`
pub async fn pdf(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "prescription")?;
    let conn = ctx.core.open_db()?;
    let (rx, appt) = load_visible_prescription(&conn, &caller, &id)?;
    let patient = CoreState::require_user(&conn, &appt.patient_id)?;
    let prescriber = CoreState::require_user(&conn, &rx.issued_by_doctor_id)?;
    let doctor_name = match prescriber.role {
        Role::Doctor => format!("Dr. {}", prescriber.full_name),
        _ => prescriber.full_name.clone(),
    };

    let bytes = documents::generate_prescription_pdf(&PrescriptionSheet {
        prescription: &rx,
        patient_name: &patient.full_name,
        doctor_name: &doctor_name,
    })?;
    let disposition = format!("attachment; filename=\"prescription-{}.pdf\"", rx.id);
    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::api::endpoints::test_support::TestApp;
    use crate::db::repository::fixtures;
    use crate::models::{Appointment, Role, User};

    struct Setup {
        app: TestApp,
        patient_token: String,
        doctor_token: String,
        appt: Appointment,
    }

    fn setup() -> Setup {
        let app = TestApp::new();
        let (patient, patient_token) = app.user("pat@example.com", Role::Patient);
        let conn = app.conn();
        let (doctor, _): (User, _) = fixtures::make_doctor(&conn, "doc@example.com", "General");
        let appt = fixtures::make_appointment(&conn, patient.id, doctor.id);
        let doctor_token = app.token_for(&doctor);
        Setup {
            app,
            patient_token,
            doctor_token,
            appt,
        }
    }

    fn body(appointment_id: uuid::Uuid) -> Value {
        json!({
            "appointment_id": appointment_id,
            "pharmacy_name": "Kiangombe Pharmacy",
            "medications": [
                {"name": "Amoxicillin", "dosage": "500mg", "frequency": "3x daily", "duration": "7 days"}
            ]
        })
    }

    async fn issue(s: &Setup) -> Value {
        let (status, json) = s
            .app
            .post("/api/prescriptions", Some(&s.doctor_token), body(s.appt.id))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json
    }

    #[tokio::test]
    async fn doctor_prescribes_once_per_appointment() {
        let s = setup();
        let rx = issue(&s).await;
        assert_eq!(rx["status"], "pending");
        assert_eq!(rx["medications"][0]["name"], "Amoxicillin");

        let (status, _) = s
            .app
            .post("/api/prescriptions", Some(&s.doctor_token), body(s.appt.id))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn patients_and_other_doctors_cannot_prescribe() {
        let s = setup();
        let (status, _) = s
            .app
            .post("/api/prescriptions", Some(&s.patient_token), body(s.appt.id))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (other, _) = fixtures::make_doctor(&s.app.conn(), "other@example.com", "ENT");
        let other_token = s.app.token_for(&other);
        let (status, _) = s
            .app
            .post("/api/prescriptions", Some(&other_token), body(s.appt.id))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn empty_medication_list_is_rejected() {
        let s = setup();
        let (status, _) = s
            .app
            .post(
                "/api/prescriptions",
                Some(&s.doctor_token),
                json!({"appointment_id": s.appt.id, "medications": []}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_moves_forward_with_the_right_roles() {
        let s = setup();
        let rx = issue(&s).await;
        let uri = format!("/api/prescriptions/{}/status", rx["id"].as_str().unwrap());
        let (_, pharmacist) = s.app.user("pharm@example.com", Role::Pharmacist);

        // no skipping
        let (status, _) = s
            .app
            .put(&uri, Some(&pharmacist), json!({"status": "fulfilled"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // pharmacists do not approve
        let (status, _) = s
            .app
            .put(&uri, Some(&pharmacist), json!({"status": "approved"}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = s
            .app
            .put(&uri, Some(&s.doctor_token), json!({"status": "approved"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["verified"], true);

        let (status, json) = s
            .app
            .put(&uri, Some(&pharmacist), json!({"status": "fulfilled"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "fulfilled");

        // no reversals
        let (status, _) = s
            .app
            .put(&uri, Some(&s.doctor_token), json!({"status": "pending"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn edits_only_while_pending() {
        let s = setup();
        let rx = issue(&s).await;
        let uri = format!("/api/prescriptions/{}", rx["id"].as_str().unwrap());
        let (status, json) = s
            .app
            .put(&uri, Some(&s.doctor_token), json!({"pharmacy_name": "Town Chemist"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pharmacy_name"], "Town Chemist");

        s.app
            .put(&format!("{uri}/status"), Some(&s.doctor_token), json!({"status": "approved"}))
            .await;
        let (status, _) = s
            .app
            .put(&uri, Some(&s.doctor_token), json!({"pharmacy_name": "Elsewhere"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expiry_date_cannot_be_moved_into_the_past() {
        let s = setup();
        let mut req = body(s.appt.id);
        req["expiry_date"] = json!("2000-01-01");
        let (status, _) = s.app.post("/api/prescriptions", Some(&s.doctor_token), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let rx = issue(&s).await;
        let uri = format!("/api/prescriptions/{}", rx["id"].as_str().unwrap());
        let (status, json) = s
            .app
            .put(&uri, Some(&s.doctor_token), json!({"expiry_date": "2000-01-01"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

        let next_year = (chrono::Utc::now().date_naive() + chrono::Duration::days(365)).to_string();
        let (status, json) = s
            .app
            .put(&uri, Some(&s.doctor_token), json!({"expiry_date": next_year}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["expiry_date"], next_year);
    }

    #[tokio::test]
    async fn patient_sees_own_prescriptions_only() {
        let s = setup();
        let rx = issue(&s).await;
        let (_, stranger) = s.app.user("stranger@example.com", Role::Patient);

        let (_, list) = s.app.get("/api/prescriptions", Some(&s.patient_token)).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        let (_, list) = s.app.get("/api/prescriptions", Some(&stranger)).await;
        assert_eq!(list.as_array().unwrap().len(), 0);

        let uri = format!("/api/prescriptions/{}", rx["id"].as_str().unwrap());
        let (status, _) = s.app.get(&uri, Some(&stranger)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn qr_and_pdf_downloads() {
        let s = setup();
        let rx = issue(&s).await;
        let id = rx["id"].as_str().unwrap();

        let response = s
            .app
            .send(Method::GET, &format!("/api/prescriptions/{id}/qr"), Some(&s.patient_token), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/svg+xml");

        let response = s
            .app
            .send(Method::GET, &format!("/api/prescriptions/{id}/pdf"), Some(&s.patient_token), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/pdf");
        let bytes = to_bytes(response.into_body(), 1 << 22).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
