use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CodePurpose, Role};

/// Account row. Carries the password hash, so it is never serialized
/// directly; handlers answer with [`UserProfile`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub role: Role,
    pub staff_role_id: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub role: Role,
    pub staff_role_id: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            gender: user.gender.clone(),
            date_of_birth: user.date_of_birth,
            address: user.address.clone(),
            profile_picture: user.profile_picture.clone(),
            role: user.role,
            staff_role_id: user.staff_role_id.clone(),
            is_active: user.is_active,
            is_verified: user.is_verified,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: CodePurpose,
    pub code_hash: String,
    pub expires_at: NaiveDateTime,
    pub attempts: i64,
    pub consumed: bool,
    pub created_at: NaiveDateTime,
}
