//! User directory and self-service profile edits.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::endpoints::{log_activity, ClientInfo};
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, AuthUser};
use crate::api::validation;
use crate::authorization;
use crate::core_state::CoreState;
use crate::db::repository;
use crate::models::{Role, UserProfile};

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// `GET /api/users?role=`: admins only.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    caller.require_admin()?;
    let role = query
        .role
        .as_deref()
        .map(|r| validation::enum_value::<Role>(r, "role", Role::ALL))
        .transpose()?;

    let conn = ctx.core.open_db()?;
    let users = repository::list_users(&conn, role)?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

/// `GET /api/users/:id`: self or an administrator.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let id = parse_id(&id, "user")?;
    if !authorization::can_view_user(&caller.actor(), &id) {
        return Err(ApiError::forbidden("Not authorized to view this user"));
    }
    let conn = ctx.core.open_db()?;
    let user = CoreState::require_user(&conn, &id)?;
    Ok(Json(UserProfile::from(&user)))
}

/// `PUT /api/users/me`
pub async fn update_me(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    client: ClientInfo,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let conn = ctx.core.open_db()?;
    let mut user = CoreState::require_user(&conn, &caller.user_id)?;

    if let Some(name) = &req.full_name {
        user.full_name = validation::full_name(name)?;
    }
    if req.phone.is_some() {
        user.phone = validation::optional_text(req.phone.as_deref(), "Phone", 20)?;
    }
    if req.gender.is_some() {
        user.gender = validation::gender(req.gender.as_deref())?;
    }
    if req.date_of_birth.is_some() {
        user.date_of_birth = validation::optional_date(req.date_of_birth.as_deref(), "date of birth")?;
    }
    if req.address.is_some() {
        user.address = validation::optional_text(req.address.as_deref(), "Address", 255)?;
    }
    if req.profile_picture.is_some() {
        user.profile_picture =
            validation::optional_text(req.profile_picture.as_deref(), "Profile picture", 500)?;
    }

    repository::update_user_profile(&conn, &user)?;
    log_activity(&conn, user.id, "Profile updated", &client);
    let user = CoreState::require_user(&conn, &user.id)?;
    Ok(Json(UserProfile::from(&user)))
}

/// `PUT /api/users/:id/active`: super admin (de)activates an account.
pub async fn set_active(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    caller.require(&[Role::SuperAdmin])?;
    let id = parse_id(&id, "user")?;
    if id == caller.user_id && !req.is_active {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let conn = ctx.core.open_db()?;
    CoreState::require_user(&conn, &id)?;
    repository::set_user_active(&conn, &id, req.is_active)?;
    let user = CoreState::require_user(&conn, &id)?;

    tracing::info!(user_id = %id, is_active = req.is_active, by = %caller.user_id, "Account status changed");
    Ok(Json(UserProfile::from(&user)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::endpoints::test_support::TestApp;
    use crate::models::Role;

    #[tokio::test]
    async fn list_is_admin_only_with_role_filter() {
        let app = TestApp::new();
        let (_, admin) = app.user("ca@example.com", Role::ClinicianAdmin);
        let (_, patient) = app.user("pat@example.com", Role::Patient);
        app.user("doc@example.com", Role::Doctor);

        let (status, _) = app.get("/api/users", Some(&patient)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = app.get("/api/users?role=doctor", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["email"], "doc@example.com");

        let (status, _) = app.get("/api/users?role=wizard", Some(&admin)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_user_is_self_or_admin() {
        let app = TestApp::new();
        let (me, token) = app.user("pat@example.com", Role::Patient);
        let (other, _) = app.user("pat2@example.com", Role::Patient);

        let (status, _) = app.get(&format!("/api/users/{}", me.id), Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get(&format!("/api/users/{}", other.id), Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.get("/api/users/not-a-uuid", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_me_changes_only_given_fields() {
        let app = TestApp::new();
        let (_, token) = app.user("pat@example.com", Role::Patient);
        let (status, json) = app
            .put(
                "/api/users/me",
                Some(&token),
                json!({"full_name": "Grace Atieno", "date_of_birth": "1988-07-30"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["full_name"], "Grace Atieno");
        assert_eq!(json["date_of_birth"], "1988-07-30");
        assert_eq!(json["email"], "pat@example.com");

        let (status, _) = app
            .put("/api/users/me", Some(&token), json!({"gender": "robot"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deactivated_users_are_locked_out() {
        let app = TestApp::new();
        let (_, sa) = app.user("sa@example.com", Role::SuperAdmin);
        let (nurse, nurse_token) = app.user("nurse@example.com", Role::Nurse);

        let (status, json) = app
            .put(
                &format!("/api/users/{}/active", nurse.id),
                Some(&sa),
                json!({"is_active": false}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["is_active"], false);

        let (status, json) = app.get("/api/auth/me", Some(&nurse_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["message"], "Inactive user");
    }

    #[tokio::test]
    async fn super_admin_cannot_deactivate_self() {
        let app = TestApp::new();
        let (sa_user, sa) = app.user("sa@example.com", Role::SuperAdmin);
        let (status, _) = app
            .put(
                &format!("/api/users/{}/active", sa_user.id),
                Some(&sa),
                json!({"is_active": false}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
