use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub dosage: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub description: Option<String>,
    pub prescription_required: bool,
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub supplier: Option<String>,
    pub image_url: Option<String>,
    /// Derived from `stock` on every read.
    pub in_stock: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WishlistItem {
    pub medication: Medication,
    pub added_at: NaiveDateTime,
}
