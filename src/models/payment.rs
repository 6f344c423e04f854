use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub reference_number: Option<String>,
    pub payment_details: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}
