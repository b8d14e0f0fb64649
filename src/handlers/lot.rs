use axum::{extract::{State, Path, Query}, Json};
use serde::Deserialize;
use sqlx::Row;
use crate::state::AppState;
use crate::error::AppError;
use crate::dtos::lot::{LotResponse, LotListItem};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotQueryParams {
    pub product_id: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub status: Option<String>, // "available", "empty", "expired"
}

pub async fn list_lots(
    State(AppState { db_pool }): State<AppState>,
    Query(params): Query<LotQueryParams>,
) -> Result<Json<Vec<LotListItem>>, AppError> {
    let status_filter = match params.status.as_deref() {
        None => None,
        Some(s @ ("available" | "empty" | "expired")) => Some(s.to_string()),
        Some(_) => {
            return Err(AppError::validation(
                "Invalid status. Use: available, empty, or expired",
            ))
        }
    };

    let rows = sqlx::query(
        r#"SELECT l.id, l.lot_number, l.product_id, p.name as product_name,
                  l.warehouse_id, l.quantity, (l.unit_cost)::FLOAT8 as unit_cost,
                  l.expiry_date,
                  CASE
                      WHEN l.quantity = 0 THEN 'empty'
                      WHEN l.expiry_date < CURRENT_DATE THEN 'expired'
                      ELSE 'available'
                  END as status
           FROM inventory_lots l
           JOIN products p ON l.product_id = p.id
           WHERE ($1::BIGINT IS NULL OR l.product_id = $1)
             AND ($2::BIGINT IS NULL OR l.warehouse_id = $2)
             AND ($3::TEXT IS NULL OR
                  CASE
                      WHEN l.quantity = 0 THEN 'empty'
                      WHEN l.expiry_date < CURRENT_DATE THEN 'expired'
                      ELSE 'available'
                  END = $3)
           ORDER BY l.expiry_date ASC NULLS LAST, l.created_at ASC"#,
    )
    .bind(params.product_id)
    .bind(params.warehouse_id)
    .bind(status_filter)
    .fetch_all(&db_pool)
    .await?;

    let lots: Vec<LotListItem> = rows
        .iter()
        .map(|row| LotListItem {
            id: row.get("id"),
            lot_number: row.get("lot_number"),
            product_id: row.get("product_id"),
            product_name: row.get("product_name"),
            warehouse_id: row.get("warehouse_id"),
            quantity: row.get("quantity"),
            unit_cost: row.get("unit_cost"),
            expiry_date: row.get("expiry_date"),
            status: row.get("status"),
        })
        .collect();

    Ok(Json(lots))
}

pub async fn get_lot(
    State(AppState { db_pool }): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LotResponse>, AppError> {
    let row = sqlx::query(
        r#"SELECT l.id, l.lot_number, l.product_id, p.name as product_name,
                  l.warehouse_id, l.quantity, (l.unit_cost)::FLOAT8 as unit_cost,
                  l.expiry_date, l.created_at
           FROM inventory_lots l
           JOIN products p ON l.product_id = p.id
           WHERE l.id = $1"#,
    )
    .bind(id)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("inventory lot not found: {id}")))?;

    Ok(Json(LotResponse {
        id: row.get("id"),
        lot_number: row.get("lot_number"),
        product_id: row.get("product_id"),
        product_name: row.get("product_name"),
        warehouse_id: row.get("warehouse_id"),
        quantity: row.get("quantity"),
        unit_cost: row.get("unit_cost"),
        expiry_date: row.get("expiry_date"),
        created_at: row.get("created_at"),
    }))
}
