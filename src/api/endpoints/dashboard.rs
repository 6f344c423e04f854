//! `GET /api/dashboard/summary`: clinic-wide counters for staff.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::repository::{self, DashboardCounts};

pub async fn summary(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<DashboardCounts>, ApiError> {
    caller.require_staff()?;
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::dashboard_counts(&conn)?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::endpoints::test_support::TestApp;
    use crate::db::repository::fixtures;
    use crate::models::Role;

    #[tokio::test]
    async fn staff_see_counts_patients_do_not() {
        let app = TestApp::new();
        let (patient, patient_token) = app.user("pat@example.com", Role::Patient);
        let (_, receptionist) = app.user("rec@example.com", Role::Receptionist);
        let (doc, _) = fixtures::make_doctor(&app.conn(), "doc@example.com", "General");
        fixtures::make_appointment(&app.conn(), patient.id, doc.id);

        let (status, _) = app.get("/api/dashboard/summary", Some(&patient_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = app.get("/api/dashboard/summary", Some(&receptionist)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_users"], 3);
        assert_eq!(json["total_appointments"], 1);
        assert_eq!(json["upcoming_appointments"], 1);
        assert_eq!(json["total_prescriptions"], 0);
    }
}
