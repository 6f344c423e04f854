//! Clinic API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Auth validator → 2. Rate limiter (per user) → 3. Audit logger
//!
//! Public routes (registration, login, catalogue reads) get the rate
//! limiter only, keyed by peer address.

use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue, CACHE_CONTROL};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the clinic API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    use endpoints::{
        appointments, auth, chat, consultations, dashboard, doctor_profile, doctors, health,
        medications, mental_health, patient_profile, payments, prescriptions, staff, users,
    };

    // Layers apply bottom-up: Extension → Auth → Rate limit → Audit → Handler.
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7); static
    // segments win over params, so `/availability/bulk` never reaches `:id`.
    let protected = Router::new()
        // Accounts
        .route("/auth/me", get(auth::me))
        .route("/auth/register/admin", post(auth::register_admin))
        .route("/auth/register/staff", post(auth::register_staff))
        .route("/auth/change-password", post(auth::change_password))
        .route("/users", get(users::list))
        .route("/users/me", put(users::update_me))
        .route("/users/:id", get(users::get))
        .route("/users/:id/active", put(users::set_active))
        .route("/staff", get(staff::list))
        .route("/staff-roles", get(staff::list_roles).post(staff::create_role))
        .route("/staff-roles/:id", put(staff::update_role))
        .route("/dashboard/summary", get(dashboard::summary))
        // Doctors
        .route("/doctors", post(doctors::create))
        .route("/doctors/:id", put(doctors::update))
        .route("/doctor/profile/complete", get(doctor_profile::complete))
        .route(
            "/doctor/profile/education",
            get(doctor_profile::list_education).post(doctor_profile::add_education),
        )
        .route(
            "/doctor/profile/education/:id",
            put(doctor_profile::update_education).delete(doctor_profile::delete_education),
        )
        .route(
            "/doctor/profile/contact",
            get(doctor_profile::get_contact).put(doctor_profile::put_contact),
        )
        .route(
            "/doctor/profile/availability",
            get(doctor_profile::get_availability),
        )
        .route(
            "/doctor/profile/availability/bulk",
            put(doctor_profile::bulk_availability).post(doctor_profile::bulk_availability),
        )
        .route(
            "/doctor/profile/availability/:id",
            put(doctor_profile::update_availability),
        )
        .route(
            "/doctor/profile/settings",
            get(doctor_profile::get_settings).put(doctor_profile::put_settings),
        )
        // Appointments and consultations
        .route(
            "/appointments",
            get(appointments::list).post(appointments::create),
        )
        .route(
            "/appointments/:id",
            get(appointments::get).put(appointments::update),
        )
        .route("/appointments/:id/reschedule", post(appointments::reschedule))
        .route("/appointments/:id/cancel", post(appointments::cancel))
        .route("/appointments/:id/status", put(appointments::set_status))
        .route("/consultations/video", post(consultations::create))
        .route("/consultations/video/:id", get(consultations::get))
        .route("/consultations/video/:id/start", post(consultations::start))
        .route("/consultations/video/:id/end", post(consultations::end))
        .route("/consultations/video/:id/token", post(consultations::join_token))
        // Prescriptions and pharmacy
        .route(
            "/prescriptions",
            get(prescriptions::list).post(prescriptions::create),
        )
        .route(
            "/prescriptions/:id",
            get(prescriptions::get).put(prescriptions::update),
        )
        .route("/prescriptions/:id/status", put(prescriptions::transition))
        .route("/prescriptions/:id/qr", get(prescriptions::qr_code))
        .route("/prescriptions/:id/pdf", get(prescriptions::pdf))
        .route("/medications", post(medications::create))
        .route(
            "/medications/:id",
            put(medications::update).delete(medications::delete),
        )
        .route(
            "/patient/wishlist",
            get(medications::wishlist)
                .post(medications::add_to_wishlist)
                .delete(medications::clear_wishlist),
        )
        .route(
            "/patient/wishlist/:medication_id",
            axum::routing::delete(medications::remove_from_wishlist),
        )
        .route("/payments", post(payments::create))
        .route("/payments/history", get(payments::history))
        .route("/payments/:id/status", put(payments::update_status))
        // Chat
        .route(
            "/chat/rooms",
            get(chat::list_rooms).post(chat::open_room),
        )
        .route(
            "/chat/rooms/:id/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/chat/rooms/:id/read", post(chat::mark_read))
        .route("/chat/rooms/:id/close", post(chat::close_room))
        .route("/chat/unread", get(chat::unread))
        // Patient profile
        .route(
            "/patient/medical-info",
            get(patient_profile::get_medical_info).put(patient_profile::put_medical_info),
        )
        .route(
            "/patient/emergency-contact",
            get(patient_profile::get_emergency_contact)
                .put(patient_profile::put_emergency_contact),
        )
        .route(
            "/patient/insurance",
            get(patient_profile::get_insurance).put(patient_profile::put_insurance),
        )
        .route(
            "/patient/notification-settings",
            get(patient_profile::get_notification_settings)
                .put(patient_profile::put_notification_settings),
        )
        .route(
            "/patient/security-settings",
            get(patient_profile::get_security_settings)
                .put(patient_profile::put_security_settings),
        )
        .route("/patient/activity", get(patient_profile::activity))
        .route(
            "/patient/addresses",
            get(patient_profile::list_addresses).post(patient_profile::create_address),
        )
        .route(
            "/patient/addresses/:id",
            put(patient_profile::update_address).delete(patient_profile::delete_address),
        )
        .route(
            "/patient/addresses/:id/default",
            post(patient_profile::set_default_address),
        )
        .route(
            "/patients/:id/medical-history",
            get(patient_profile::medical_history).post(patient_profile::add_medical_history),
        )
        // Mental health
        .route(
            "/mental-health/mood",
            get(mental_health::list_mood).post(mental_health::add_mood),
        )
        .route(
            "/mental-health/games",
            get(mental_health::list_games).post(mental_health::add_game),
        )
        .route("/mental-health/score", get(mental_health::score))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes (rate-limited only, no auth required)
    let public = Router::new()
        .route("/health", get(health::check))
        .route("/auth/register", post(auth::register))
        .route("/auth/register/super-admin", post(auth::register_super_admin))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/verify-token", post(auth::verify_token))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/verify-email/code", post(auth::verify_email_code))
        .route("/auth/resend-verification", post(auth::resend_verification))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/reset-password/code", post(auth::reset_password_code))
        .route(
            "/auth/reset-password/:token",
            post(auth::reset_password_with_path_token),
        )
        .route("/doctors", get(doctors::list))
        .route("/doctors/:id", get(doctors::get))
        .route("/medications", get(medications::list))
        .route("/medications/:id", get(medications::get))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx));

    // GET and write methods on the same path live in different routers;
    // nesting both at /api merges them per path.
    Router::new()
        .nest("/api", protected)
        .nest("/api", public)
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::endpoints::test_support::TestApp;
    use crate::db::repository::fixtures;
    use crate::models::Role;

    #[tokio::test]
    async fn protected_routes_require_auth() {
        let app = TestApp::new();
        for uri in [
            "/api/auth/me",
            "/api/appointments",
            "/api/patient/wishlist",
            "/api/mental-health/score",
            "/api/dashboard/summary",
        ] {
            let (status, _) = app.get(uri, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn public_catalogue_needs_no_token() {
        let app = TestApp::new();
        fixtures::make_doctor(&app.conn(), "doc@example.com", "General");
        fixtures::make_medication(&app.conn(), "Paracetamol", "Analgesic", 10);

        let (status, doctors) = app.get("/api/doctors", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doctors.as_array().unwrap().len(), 1);

        let (status, meds) = app.get("/api/medications", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(meds.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn writes_on_public_paths_still_require_auth() {
        let app = TestApp::new();
        let (status, _) = app
            .post("/api/medications", None, serde_json::json!({"name": "X"}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, token) = app.user("pat@example.com", Role::Patient);
        let (status, _) = app
            .post("/api/medications", Some(&token), serde_json::json!({"name": "X"}))
            .await;
        assert_ne!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_throttling_ignores_forged_bearer_headers() {
        let app = TestApp::new();
        let body = serde_json::json!({"email": "nobody@example.com", "password": "wrong-password"});
        let mut throttled = 0;
        for i in 0..120 {
            let forged = format!("x.y.forged-signature-{i}");
            let (status, _) = app.post("/api/auth/login", Some(&forged), body.clone()).await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                throttled += 1;
            }
        }
        assert_eq!(throttled, 20);
    }

    #[tokio::test]
    async fn authenticated_callers_get_their_own_bucket() {
        let app = TestApp::new();
        let (_, token) = app.user("pat@example.com", Role::Patient);
        let body = serde_json::json!({"email": "nobody@example.com", "password": "wrong-password"});
        for _ in 0..100 {
            app.post("/api/auth/login", None, body.clone()).await;
        }
        let (status, _) = app.post("/api/auth/login", None, body).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = app.get("/api/auth/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = TestApp::new();
        let (status, _) = app.get("/api/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let app = TestApp::new();
        let response = app
            .send(axum::http::Method::GET, "/api/health", None, None)
            .await;
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");

        let (_, token) = app.user("pat@example.com", Role::Patient);
        let response = app
            .send(axum::http::Method::GET, "/api/auth/me", Some(&token), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }
}
