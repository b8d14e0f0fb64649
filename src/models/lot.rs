// src/models/lot.rs
//
// Lot ledger access. All mutation goes through `decrement_guarded`, which
// carries a quantity precondition so concurrent issues against the same lot
// fail cleanly instead of driving the balance negative.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use crate::stock::EligibleLot;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InventoryLot {
    pub id: i64,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub unit_cost: f64,
    pub created_at: DateTime<Utc>,
}

pub async fn by_id(
    exec: impl PgExecutor<'_>,
    id: i64,
) -> Result<Option<InventoryLot>, sqlx::Error> {
    sqlx::query_as::<_, InventoryLot>(
        r#"SELECT id, product_id, warehouse_id, lot_number, expiry_date,
                  quantity, (unit_cost)::FLOAT8 as unit_cost, created_at
           FROM inventory_lots
           WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

/// Lots a FEFO plan may draw from: in stock, unexpired as of `today`, at the
/// target warehouse. Ordered by creation so the planner's stable sort keeps
/// the oldest lot first on expiry ties.
pub async fn eligible_for_issue(
    exec: impl PgExecutor<'_>,
    product_id: i64,
    warehouse_id: i64,
    today: NaiveDate,
) -> Result<Vec<EligibleLot>, sqlx::Error> {
    let lots = sqlx::query_as::<_, InventoryLot>(
        r#"SELECT id, product_id, warehouse_id, lot_number, expiry_date,
                  quantity, (unit_cost)::FLOAT8 as unit_cost, created_at
           FROM inventory_lots
           WHERE product_id = $1
             AND warehouse_id = $2
             AND quantity > 0
             AND (expiry_date IS NULL OR expiry_date >= $3)
           ORDER BY created_at ASC, id ASC"#,
    )
    .bind(product_id)
    .bind(warehouse_id)
    .bind(today)
    .fetch_all(exec)
    .await?;

    Ok(lots
        .into_iter()
        .map(|lot| EligibleLot {
            id: lot.id,
            lot_number: lot.lot_number,
            expiry_date: lot.expiry_date,
            quantity: lot.quantity,
            unit_cost: lot.unit_cost,
        })
        .collect())
}

/// Sum of eligible stock for one product at one warehouse.
pub async fn available_quantity(
    exec: impl PgExecutor<'_>,
    product_id: i64,
    warehouse_id: i64,
    today: NaiveDate,
) -> Result<i32, sqlx::Error> {
    let total: Option<i64> = sqlx::query_scalar(
        r#"SELECT SUM(quantity)
           FROM inventory_lots
           WHERE product_id = $1
             AND warehouse_id = $2
             AND quantity > 0
             AND (expiry_date IS NULL OR expiry_date >= $3)"#,
    )
    .bind(product_id)
    .bind(warehouse_id)
    .bind(today)
    .fetch_one(exec)
    .await?;

    Ok(total.unwrap_or(0) as i32)
}

/// Decrements a lot, refusing to go below zero. Returns false when the lot
/// no longer holds `quantity` units (a concurrent issue won the race); the
/// caller aborts its transaction.
pub async fn decrement_guarded(
    exec: impl PgExecutor<'_>,
    lot_id: i64,
    quantity: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE inventory_lots
           SET quantity = quantity - $1
           WHERE id = $2 AND quantity >= $1"#,
    )
    .bind(quantity)
    .bind(lot_id)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() == 1)
}
