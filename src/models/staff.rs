use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffRole {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub requires_specialization: bool,
    pub requires_license: bool,
    pub default_consultation_fee: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: String,
    pub bio: Option<String>,
    pub rating: f64,
    pub license_number: Option<String>,
    pub is_available: bool,
    pub consultation_fee: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

/// Public doctor card: the profile row joined with its account.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorListing {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub profile_picture: Option<String>,
}

/// Nurse, receptionist, lab technician and pharmacist rows share one shape;
/// `role` names the table the row lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub license_number: Option<String>,
    pub is_available: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffMember {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub staff_role_id: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub is_available: bool,
    pub is_active: bool,
}
