use serde::Serialize;
use chrono::{NaiveDate, DateTime, Utc};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotResponse {
    pub id: i64,
    pub lot_number: String,
    pub product_id: i64,
    pub product_name: String,
    pub warehouse_id: i64,
    pub quantity: i32,
    pub unit_cost: f64,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotListItem {
    pub id: i64,
    pub lot_number: String,
    pub product_id: i64,
    pub product_name: String,
    pub warehouse_id: i64,
    pub quantity: i32,
    pub unit_cost: f64,
    pub expiry_date: Option<NaiveDate>,
    pub status: String, // "available", "empty", "expired"
}
