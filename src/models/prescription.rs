use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PrescriptionStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescribedMedication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub issued_by_doctor_id: Uuid,
    pub pharmacy_name: Option<String>,
    pub medications: Vec<PrescribedMedication>,
    pub status: PrescriptionStatus,
    pub issued_date: NaiveDateTime,
    pub expiry_date: Option<NaiveDate>,
    pub verified: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}
