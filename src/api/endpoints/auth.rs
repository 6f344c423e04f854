//! Account endpoints: registration, login, token refresh, email
//! verification and password recovery.
//!
//! Verification and reset mails carry both a signed link token and a
//! six-digit code; either one completes the flow.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::{log_activity, ClientInfo};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, MessageResponse};
use crate::api::validation;
use crate::core_state::CoreState;
use crate::crypto::{self, TokenKind};
use crate::db::{now, repository};
use crate::mailer;
use crate::models::{CodePurpose, Doctor, Role, StaffProfile, User, UserProfile, VerificationCode};

const FORGOT_PASSWORD_REPLY: &str =
    "If an account exists for this email, a password reset link has been sent";
const RESEND_REPLY: &str =
    "If an unverified account exists for this email, a new verification email has been sent";

// ═══════════════════════════════════════════════════════════
// Request / response bodies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StaffRegisterRequest {
    #[serde(flatten)]
    pub account: RegisterRequest,
    pub role: String,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub bio: Option<String>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordCodeRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub expires_in: i64,
    pub user: UserProfile,
}

// ═══════════════════════════════════════════════════════════
// Shared steps
// ═══════════════════════════════════════════════════════════

/// Checked registration fields; the password is hashed on insert.
struct NewAccount {
    full_name: String,
    email: String,
    password: String,
    phone: Option<String>,
    gender: Option<String>,
    date_of_birth: Option<NaiveDate>,
    address: Option<String>,
}

fn validate_account(req: &RegisterRequest) -> Result<NewAccount, ApiError> {
    let full_name = validation::full_name(&req.full_name)?;
    let email = validation::normalize_email(&req.email)?;
    validation::password(&req.password)?;
    Ok(NewAccount {
        full_name,
        email,
        password: req.password.clone(),
        phone: validation::optional_text(req.phone.as_deref(), "Phone", 20)?,
        gender: validation::gender(req.gender.as_deref())?,
        date_of_birth: validation::optional_date(req.date_of_birth.as_deref(), "date of birth")?,
        address: validation::optional_text(req.address.as_deref(), "Address", 255)?,
    })
}

fn create_account(
    ctx: &ApiContext,
    conn: &Connection,
    account: NewAccount,
    role: Role,
    verified: bool,
    staff_role_id: Option<String>,
) -> Result<User, ApiError> {
    if repository::email_exists(conn, &account.email)? {
        return Err(ApiError::bad_request("Email already registered"));
    }
    let user = User {
        id: Uuid::new_v4(),
        full_name: account.full_name,
        email: account.email,
        password_hash: ctx.core.passwords().hash(&account.password)?,
        phone: account.phone,
        gender: account.gender,
        date_of_birth: account.date_of_birth,
        address: account.address,
        profile_picture: None,
        role,
        staff_role_id,
        is_active: true,
        is_verified: verified,
        last_login: None,
        created_at: now(),
        updated_at: None,
    };
    repository::insert_user(conn, &user)?;
    Ok(user)
}

/// Store a fresh code for `purpose`, replacing any outstanding one.
fn issue_code(conn: &Connection, user_id: Uuid, purpose: CodePurpose) -> Result<String, ApiError> {
    let code = crypto::generate_code();
    let created_at = now();
    repository::replace_verification_code(
        conn,
        &VerificationCode {
            id: Uuid::new_v4(),
            user_id,
            purpose,
            code_hash: crypto::hash_code(&code),
            expires_at: created_at + Duration::minutes(crypto::CODE_TTL_MINUTES),
            attempts: 0,
            consumed: false,
            created_at,
        },
    )?;
    Ok(code)
}

/// Check and burn a code. Wrong guesses count toward the attempt cap.
fn redeem_code(
    conn: &Connection,
    user_id: Uuid,
    purpose: CodePurpose,
    code: &str,
) -> Result<(), ApiError> {
    let invalid = || ApiError::bad_request("Invalid or expired code");
    if !crypto::is_well_formed_code(code) {
        return Err(invalid());
    }
    let stored = repository::active_verification_code(conn, &user_id, purpose)?.ok_or_else(invalid)?;
    if stored.attempts >= crypto::MAX_CODE_ATTEMPTS {
        return Err(ApiError::bad_request("Too many attempts. Request a new code"));
    }
    if !crypto::code_matches(code, &stored.code_hash) {
        let attempts = repository::record_failed_attempt(conn, &stored.id)?;
        tracing::warn!(%user_id, purpose = %purpose, attempts, "Wrong verification code");
        return Err(invalid());
    }
    repository::consume_verification_code(conn, &stored.id)?;
    Ok(())
}

/// Burn an outstanding code once the matching link has been used.
fn discard_code(conn: &Connection, user_id: Uuid, purpose: CodePurpose) -> Result<(), ApiError> {
    if let Some(stored) = repository::active_verification_code(conn, &user_id, purpose)? {
        repository::consume_verification_code(conn, &stored.id)?;
    }
    Ok(())
}

fn send_verification(ctx: &ApiContext, conn: &Connection, user: &User) -> Result<(), ApiError> {
    let token = ctx.core.issue_token(user, TokenKind::EmailVerification)?;
    let code = issue_code(conn, user.id, CodePurpose::EmailVerification)?;
    mailer::deliver(
        ctx.core.mailer(),
        mailer::verification_email(&user.email, &user.full_name, ctx.core.frontend_url(), &token, &code),
    );
    Ok(())
}

fn send_welcome(ctx: &ApiContext, user: &User) {
    mailer::deliver(
        ctx.core.mailer(),
        mailer::welcome_email(&user.email, &user.full_name, ctx.core.frontend_url()),
    );
}

fn token_response(ctx: &ApiContext, user: &User) -> Result<TokenResponse, ApiError> {
    Ok(TokenResponse {
        access_token: ctx.core.issue_token(user, TokenKind::Access)?,
        refresh_token: ctx.core.issue_token(user, TokenKind::Refresh)?,
        token_type: "bearer",
        expires_in: ctx.core.access_token_seconds(),
        user: UserProfile::from(user),
    })
}

fn complete_verification(
    ctx: &ApiContext,
    conn: &Connection,
    user: &User,
    client: &ClientInfo,
) -> Result<(), ApiError> {
    repository::mark_verified(conn, &user.id)?;
    log_activity(conn, user.id, "Email verified", client);
    send_welcome(ctx, user);
    tracing::info!(user_id = %user.id, "Email verified");
    Ok(())
}

fn set_new_password(
    ctx: &ApiContext,
    conn: &Connection,
    user: &User,
    new_password: &str,
    client: &ClientInfo,
) -> Result<(), ApiError> {
    let hash = ctx.core.passwords().hash(new_password)?;
    repository::set_password_hash(conn, &user.id, &hash)?;
    log_activity(conn, user.id, "Password reset", client);
    tracing::info!(user_id = %user.id, "Password reset");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════════════════════

/// `POST /api/auth/register`: patient self-registration.
pub async fn register(
    State(ctx): State<ApiContext>,
    client: ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let account = validate_account(&req)?;
    let conn = ctx.core.open_db()?;
    let user = create_account(&ctx, &conn, account, Role::Patient, false, None)?;
    send_verification(&ctx, &conn, &user)?;
    log_activity(&conn, user.id, "Account created", &client);

    tracing::info!(user_id = %user.id, "Patient registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

/// `POST /api/auth/register/super-admin`: bootstrap, allowed once.
pub async fn register_super_admin(
    State(ctx): State<ApiContext>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let account = validate_account(&req)?;
    let conn = ctx.core.open_db()?;
    if repository::count_users_with_role(&conn, Role::SuperAdmin)? > 0 {
        return Err(ApiError::forbidden("Super admin already exists"));
    }
    let user = create_account(&ctx, &conn, account, Role::SuperAdmin, true, None)?;

    tracing::info!(user_id = %user.id, "Super admin registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

/// `POST /api/auth/register/admin`: super admin creates a clinician admin.
pub async fn register_admin(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    caller.require(&[Role::SuperAdmin])?;
    let account = validate_account(&req)?;
    let conn = ctx.core.open_db()?;
    let user = create_account(&ctx, &conn, account, Role::ClinicianAdmin, true, None)?;
    send_welcome(&ctx, &user);

    tracing::info!(user_id = %user.id, created_by = %caller.user_id, "Clinician admin registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

/// `POST /api/auth/register/staff`: admins create staff with a role profile.
pub async fn register_staff(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<StaffRegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    caller.require_admin()?;

    let role = validation::enum_value::<Role>(&req.role, "role", Role::ALL)?;
    if !role.is_registrable_staff() {
        return Err(ApiError::bad_request(
            "Role must be one of: doctor, nurse, receptionist, lab_technician, pharmacist",
        ));
    }
    let specialization = validation::optional_text(req.specialization.as_deref(), "Specialization", 100)?;
    let license_number = validation::optional_text(req.license_number.as_deref(), "License number", 50)?;
    let bio = validation::optional_text(req.bio.as_deref(), "Bio", 2000)?;
    let account = validate_account(&req.account)?;

    let conn = ctx.core.open_db()?;
    let staff_role = match repository::default_staff_role_id(role) {
        Some(id) => repository::get_staff_role(&conn, id)?,
        None => None,
    };
    if let Some(staff_role) = &staff_role {
        if !staff_role.is_active {
            return Err(ApiError::bad_request(format!(
                "Staff role {} is not active",
                staff_role.name
            )));
        }
        if staff_role.requires_specialization && specialization.is_none() {
            return Err(ApiError::bad_request(format!(
                "Specialization is required for {}",
                staff_role.name
            )));
        }
        if staff_role.requires_license && license_number.is_none() {
            return Err(ApiError::bad_request(format!(
                "License number is required for {}",
                staff_role.name
            )));
        }
    }
    let consultation_fee = match req.consultation_fee {
        Some(fee) if !fee.is_finite() || fee < 0.0 => {
            return Err(ApiError::bad_request("Consultation fee cannot be negative"))
        }
        Some(fee) => Some(fee),
        None => staff_role.as_ref().and_then(|r| r.default_consultation_fee),
    };
    if role == Role::Doctor {
        if let Some(license) = &license_number {
            if repository::license_number_taken(&conn, license)? {
                return Err(ApiError::bad_request("License number already registered"));
            }
        }
    }

    let tx = conn.unchecked_transaction()?;
    let user = create_account(
        &ctx,
        &tx,
        account,
        role,
        true,
        staff_role.as_ref().map(|r| r.id.clone()),
    )?;
    if role == Role::Doctor {
        repository::insert_doctor(
            &tx,
            &Doctor {
                id: Uuid::new_v4(),
                user_id: user.id,
                specialization: specialization.unwrap_or_else(|| "General Practice".into()),
                bio,
                rating: 0.0,
                license_number,
                is_available: true,
                consultation_fee,
                created_at: now(),
                updated_at: None,
            },
        )?;
    } else {
        repository::insert_staff_profile(
            &tx,
            &StaffProfile {
                id: Uuid::new_v4(),
                user_id: user.id,
                role,
                specialization,
                bio,
                license_number,
                is_available: true,
                created_at: now(),
                updated_at: None,
            },
        )?;
    }
    tx.commit()?;
    send_welcome(&ctx, &user);

    tracing::info!(user_id = %user.id, role = %role, created_by = %caller.user_id, "Staff registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

// ═══════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════

/// `POST /api/auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let conn = ctx.core.open_db()?;
    let user = repository::get_user_by_email(&conn, &email)?.ok_or(ApiError::InvalidCredentials)?;

    if !matches!(ctx.core.passwords().verify(&req.password, &user.password_hash), Ok(true)) {
        tracing::warn!(user_id = %user.id, "Failed login");
        return Err(ApiError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }
    if !user.is_verified {
        return Err(ApiError::forbidden(
            "Email not verified. Check your inbox for the verification link",
        ));
    }

    repository::record_login(&conn, &user.id)?;
    log_activity(&conn, user.id, "Login", &client);
    let user = CoreState::require_user(&conn, &user.id)?;

    tracing::info!(user_id = %user.id, role = %user.role, "Login");
    Ok(Json(token_response(&ctx, &user)?))
}

/// `POST /api/auth/refresh`: trade a refresh token for a new pair.
pub async fn refresh(
    State(ctx): State<ApiContext>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let claims = ctx.core.tokens().verify(&req.refresh_token, TokenKind::Refresh)?;
    let conn = ctx.core.open_db()?;
    let user = repository::get_user(&conn, &claims.sub)?.ok_or(ApiError::Unauthorized)?;
    if !user.is_active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }
    Ok(Json(token_response(&ctx, &user)?))
}

/// `POST /api/auth/verify-token`: check an access token without using it.
pub async fn verify_token(
    State(ctx): State<ApiContext>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<VerifyTokenResponse>, ApiError> {
    let claims = ctx.core.tokens().verify(&req.token, TokenKind::Access)?;
    let conn = ctx.core.open_db()?;
    let user = repository::get_user(&conn, &claims.sub)?.ok_or(ApiError::Unauthorized)?;
    if !user.is_active {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(VerifyTokenResponse {
        valid: true,
        expires_in: claims.expires_in(),
        user: UserProfile::from(&user),
    }))
}

/// `GET /api/auth/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<UserProfile>, ApiError> {
    let conn = ctx.core.open_db()?;
    let user = CoreState::require_user(&conn, &caller.user_id)?;
    Ok(Json(UserProfile::from(&user)))
}

// ═══════════════════════════════════════════════════════════
// Email verification
// ═══════════════════════════════════════════════════════════

/// `POST /api/auth/verify-email` with the link token.
pub async fn verify_email(
    State(ctx): State<ApiContext>,
    client: ClientInfo,
    Json(req): Json<TokenRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let claims = ctx.core.tokens().verify(&req.token, TokenKind::EmailVerification)?;
    let conn = ctx.core.open_db()?;
    let user = repository::get_user(&conn, &claims.sub)?.ok_or(ApiError::Unauthorized)?;
    if user.is_verified {
        return Ok(Json(MessageResponse::new("Email already verified")));
    }
    discard_code(&conn, user.id, CodePurpose::EmailVerification)?;
    complete_verification(&ctx, &conn, &user, &client)?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// `POST /api/auth/verify-email/code` with the six-digit code.
pub async fn verify_email_code(
    State(ctx): State<ApiContext>,
    client: ClientInfo,
    Json(req): Json<CodeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let conn = ctx.core.open_db()?;
    let user = repository::get_user_by_email(&conn, &email)?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired code"))?;
    if user.is_verified {
        return Ok(Json(MessageResponse::new("Email already verified")));
    }
    redeem_code(&conn, user.id, CodePurpose::EmailVerification, &req.code)?;
    complete_verification(&ctx, &conn, &user, &client)?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// `POST /api/auth/resend-verification`: same reply whether or not the email exists.
pub async fn resend_verification(
    State(ctx): State<ApiContext>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let conn = ctx.core.open_db()?;
    if let Some(user) = repository::get_user_by_email(&conn, &email)? {
        if !user.is_verified && user.is_active {
            send_verification(&ctx, &conn, &user)?;
        }
    }
    Ok(Json(MessageResponse::new(RESEND_REPLY)))
}

// ═══════════════════════════════════════════════════════════
// Passwords
// ═══════════════════════════════════════════════════════════

/// `POST /api/auth/forgot-password`: same reply whether or not the email exists.
pub async fn forgot_password(
    State(ctx): State<ApiContext>,
    client: ClientInfo,
    Json(req): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let conn = ctx.core.open_db()?;
    if let Some(user) = repository::get_user_by_email(&conn, &email)?.filter(|u| u.is_active) {
        let token = ctx.core.issue_token(&user, TokenKind::PasswordReset)?;
        let code = issue_code(&conn, user.id, CodePurpose::PasswordReset)?;
        mailer::deliver(
            ctx.core.mailer(),
            mailer::password_reset_email(&user.email, &user.full_name, ctx.core.frontend_url(), &token, &code),
        );
        log_activity(&conn, user.id, "Password reset requested", &client);
    }
    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_REPLY)))
}

fn reset_with_token(
    ctx: &ApiContext,
    token: &str,
    new_password: &str,
    client: &ClientInfo,
) -> Result<(), ApiError> {
    validation::password(new_password)?;
    let claims = ctx.core.tokens().verify(token, TokenKind::PasswordReset)?;
    let conn = ctx.core.open_db()?;
    let user = repository::get_user(&conn, &claims.sub)?.ok_or(ApiError::Unauthorized)?;
    discard_code(&conn, user.id, CodePurpose::PasswordReset)?;
    set_new_password(ctx, &conn, &user, new_password, client)
}

/// `POST /api/auth/reset-password` with the token in the body.
pub async fn reset_password(
    State(ctx): State<ApiContext>,
    client: ClientInfo,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    reset_with_token(&ctx, &req.token, &req.new_password, &client)?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// `POST /api/auth/reset-password/:token`, the shape the emailed link posts to.
pub async fn reset_password_with_path_token(
    State(ctx): State<ApiContext>,
    Path(token): Path<String>,
    client: ClientInfo,
    Json(req): Json<NewPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    reset_with_token(&ctx, &token, &req.new_password, &client)?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// `POST /api/auth/reset-password/code`
pub async fn reset_password_code(
    State(ctx): State<ApiContext>,
    client: ClientInfo,
    Json(req): Json<ResetPasswordCodeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validation::password(&req.new_password)?;
    let email = req.email.trim().to_lowercase();
    let conn = ctx.core.open_db()?;
    let user = repository::get_user_by_email(&conn, &email)?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired code"))?;
    redeem_code(&conn, user.id, CodePurpose::PasswordReset, &req.code)?;
    set_new_password(&ctx, &conn, &user, &req.new_password, &client)?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// `POST /api/auth/change-password`
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthUser>,
    client: ClientInfo,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validation::password(&req.new_password)?;
    let conn = ctx.core.open_db()?;
    let user = CoreState::require_user(&conn, &caller.user_id)?;
    if !matches!(ctx.core.passwords().verify(&req.current_password, &user.password_hash), Ok(true)) {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    if req.current_password == req.new_password {
        return Err(ApiError::bad_request(
            "New password must be different from the current password",
        ));
    }
    let hash = ctx.core.passwords().hash(&req.new_password)?;
    repository::set_password_hash(&conn, &user.id, &hash)?;
    log_activity(&conn, user.id, "Password changed", &client);
    Ok(Json(MessageResponse::new("Password changed successfully")))
}
