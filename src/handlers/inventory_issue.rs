use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{FromRow, Postgres, Transaction};

use crate::dtos::inventory_issue::{
    AllocationResponse, IssueDetailResponse, IssueLine, IssueListItem, IssueResponse,
    ProductSuggestion, parse_issue_request, sum_allocations_by_lot,
};
use crate::error::AppError;
use crate::issue_code::{day_prefix, issue_code};
use crate::middleware::auth::AuthContext;
use crate::models::{lot, product};
use crate::state::AppState;
use crate::stock::{find_shortages, plan_fefo, FefoError, ProductDemand};

// ==================== Create Issue ====================

/// One allocation resolved against the ledger, with the lot state snapshotted
/// before the decrement.
struct ResolvedPick {
    lot_id: i64,
    lot_number: String,
    expiry_date: Option<NaiveDate>,
    quantity: i32,
    unit_cost: f64,
}

pub async fn create_issue(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<IssueResponse>), AppError> {
    let req = parse_issue_request(&body)?;
    let today = Utc::now().date_naive();

    // Everything below runs inside one transaction: any error path drops the
    // transaction un-committed and no lot, issue, department or ledger write
    // survives.
    let mut tx = db_pool.begin().await?;

    let warehouse_exists: Option<i64> =
        sqlx::query_scalar(r#"SELECT id FROM warehouses WHERE id = $1"#)
            .bind(req.warehouse_id)
            .fetch_optional(&mut *tx)
            .await?;
    if warehouse_exists.is_none() {
        return Err(AppError::not_found(format!(
            "warehouse not found: {}",
            req.warehouse_id
        )));
    }

    // Aggregate demand per product, first-seen order, lines for the same
    // product merged.
    let mut demand_order: Vec<i64> = Vec::new();
    let mut demands: std::collections::HashMap<i64, i32> = std::collections::HashMap::new();
    for line in &req.lines {
        let entry = demands.entry(line.product_id).or_insert_with(|| {
            demand_order.push(line.product_id);
            0
        });
        *entry += line.quantity;
    }

    let mut products: std::collections::HashMap<i64, product::Product> =
        std::collections::HashMap::new();
    let mut aggregate = Vec::with_capacity(demand_order.len());
    for product_id in &demand_order {
        let product = product::by_id(&mut *tx, *product_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("product not found: {product_id}")))?;
        let available =
            lot::available_quantity(&mut *tx, *product_id, req.warehouse_id, today).await?;
        aggregate.push(ProductDemand {
            product_id: *product_id,
            product_name: product.name.clone(),
            requested: demands[product_id],
            available,
        });
        products.insert(*product_id, product);
    }

    // Advisory fast-fail; the guarded decrements below remain authoritative.
    let shortages = find_shortages(&aggregate);
    if !shortages.is_empty() {
        return Err(AppError::insufficient_stock(shortages));
    }

    let (department_id, department_name) =
        resolve_department(&mut tx, &req.department).await?;

    // Resolve lots per line (manual split or FEFO plan) and decrement.
    let mut resolved: Vec<(IssueLine, Vec<ResolvedPick>)> = Vec::with_capacity(req.lines.len());
    let mut total_amount = 0.0;
    for line in &req.lines {
        let product = &products[&line.product_id];
        let picks: Vec<ResolvedPick> = match &line.allocations {
            Some(allocations) => {
                // Duplicate entries against one lot are checked against their
                // summed demand, so an over-draw split across entries reports
                // lot-level insufficient stock instead of racing the guarded
                // decrement.
                let mut lots = std::collections::HashMap::new();
                for (lot_id, requested) in sum_allocations_by_lot(allocations) {
                    let lot_row = lot::by_id(&mut *tx, lot_id).await?.ok_or_else(|| {
                        AppError::not_found(format!("inventory lot not found: {lot_id}"))
                    })?;
                    if lot_row.quantity < requested {
                        return Err(AppError::validation(format!(
                            "lot '{}' insufficient quantity; available: {}, requested: {}",
                            lot_row.lot_number, lot_row.quantity, requested
                        )));
                    }
                    lots.insert(lot_id, lot_row);
                }
                allocations
                    .iter()
                    .map(|allocation| {
                        let lot_row = &lots[&allocation.inventory_lot_id];
                        ResolvedPick {
                            lot_id: lot_row.id,
                            lot_number: lot_row.lot_number.clone(),
                            expiry_date: lot_row.expiry_date,
                            quantity: allocation.quantity,
                            unit_cost: lot_row.unit_cost,
                        }
                    })
                    .collect()
            }
            None => {
                let eligible =
                    lot::eligible_for_issue(&mut *tx, line.product_id, req.warehouse_id, today)
                        .await?;
                let plan = plan_fefo(&eligible, line.quantity, today).map_err(
                    |FefoError::NotEnough { available, requested }| {
                        AppError::validation(format!(
                            "no eligible lots for product '{}'; available: {}, requested: {}",
                            product.name, available, requested
                        ))
                    },
                )?;
                plan.into_iter()
                    .map(|pick| {
                        let lot_row = eligible.iter().find(|l| l.id == pick.lot_id).unwrap();
                        ResolvedPick {
                            lot_id: lot_row.id,
                            lot_number: lot_row.lot_number.clone(),
                            expiry_date: lot_row.expiry_date,
                            quantity: pick.quantity,
                            unit_cost: lot_row.unit_cost,
                        }
                    })
                    .collect()
            }
        };

        for pick in &picks {
            let ok = lot::decrement_guarded(&mut *tx, pick.lot_id, pick.quantity).await?;
            if !ok {
                // A concurrent issue drained the lot between our read and the
                // update; abort and let the caller retry.
                return Err(AppError::conflict(format!(
                    "lot '{}' was modified concurrently, please retry",
                    pick.lot_number
                )));
            }
        }

        total_amount += line.quantity as f64 * line.unit_price;
        resolved.push((line.clone(), picks));
    }

    // Daily-reset sequence, counted inside the transaction; the UNIQUE
    // constraint on issue_code backs up the residual same-day race.
    let minted_today: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM inventory_issues WHERE issue_code LIKE $1"#)
            .bind(day_prefix(today))
            .fetch_one(&mut *tx)
            .await?;
    let code = issue_code(today, minted_today + 1);

    let (issue_id, created_at, confirmed_at) = sqlx::query_as::<_, (i64, DateTime<Utc>, DateTime<Utc>)>(
        r#"INSERT INTO inventory_issues
               (issue_code, warehouse_id, department_id, issue_date, notes,
                total_amount, status, created_by, confirmed_by, confirmed_at)
           VALUES ($1, $2, $3, $4, $5, $6::FLOAT8, 'confirmed', $7, $7, NOW())
           RETURNING id, created_at, confirmed_at"#,
    )
    .bind(&code)
    .bind(req.warehouse_id)
    .bind(department_id)
    .bind(req.issue_date)
    .bind(&req.notes)
    .bind(total_amount)
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut detail_responses = Vec::with_capacity(resolved.len());
    for (line_no, (line, picks)) in resolved.iter().enumerate() {
        let line_total = line.quantity as f64 * line.unit_price;
        let detail_id: i64 = sqlx::query_scalar(
            r#"INSERT INTO inventory_issue_details
                   (issue_id, line_no, product_id, quantity, unit_price, line_total)
               VALUES ($1, $2, $3, $4, $5::FLOAT8, $6::FLOAT8)
               RETURNING id"#,
        )
        .bind(issue_id)
        .bind((line_no + 1) as i32)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line_total)
        .fetch_one(&mut *tx)
        .await?;

        let mut allocation_responses = Vec::with_capacity(picks.len());
        for pick in picks {
            sqlx::query(
                r#"INSERT INTO issue_lot_allocations
                       (detail_id, lot_id, lot_number, expiry_date, quantity, unit_cost)
                   VALUES ($1, $2, $3, $4, $5, $6::FLOAT8)"#,
            )
            .bind(detail_id)
            .bind(pick.lot_id)
            .bind(&pick.lot_number)
            .bind(pick.expiry_date)
            .bind(pick.quantity)
            .bind(pick.unit_cost)
            .execute(&mut *tx)
            .await?;

            allocation_responses.push(AllocationResponse {
                lot_id: pick.lot_id,
                lot_number: pick.lot_number.clone(),
                expiry_date: pick.expiry_date,
                quantity: pick.quantity,
                unit_cost: pick.unit_cost,
            });
        }

        detail_responses.push(IssueDetailResponse {
            id: detail_id,
            product_id: line.product_id,
            product_name: products[&line.product_id].name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total,
            lot_allocations: allocation_responses,
        });
    }

    // Mirrored ledger entry so inbound and outbound movements report through
    // one transaction history.
    let transaction_id: i64 = sqlx::query_scalar(
        r#"INSERT INTO transactions
               (transaction_type, reference_id, warehouse_id, transaction_date, created_by)
           VALUES ('issue', $1, $2, $3, $4)
           RETURNING id"#,
    )
    .bind(issue_id)
    .bind(req.warehouse_id)
    .bind(req.issue_date)
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await?;

    for (line, picks) in &resolved {
        for pick in picks {
            sqlx::query(
                r#"INSERT INTO transaction_details
                       (transaction_id, product_id, lot_id, quantity, unit_cost)
                   VALUES ($1, $2, $3, $4, $5::FLOAT8)"#,
            )
            .bind(transaction_id)
            .bind(line.product_id)
            .bind(pick.lot_id)
            .bind(pick.quantity)
            .bind(pick.unit_cost)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    tracing::info!(
        issue_code = %code,
        user = %auth.username,
        role = %auth.role,
        total_amount,
        "inventory issue created"
    );

    Ok((
        StatusCode::CREATED,
        Json(IssueResponse {
            id: issue_id,
            issue_code: code,
            warehouse_id: req.warehouse_id,
            department_id,
            department: department_name,
            issue_date: req.issue_date,
            notes: req.notes,
            status: "confirmed".to_string(),
            total_amount,
            created_by: auth.user_id,
            confirmed_by: Some(auth.user_id),
            confirmed_at: Some(confirmed_at),
            created_at,
            details: detail_responses,
        }),
    ))
}

/// Departments are keyed by trimmed name and materialized on first use; the
/// generated code follows the count of existing departments. Concurrent first
/// use of the same new name loses to the UNIQUE(name) constraint.
async fn resolve_department(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
) -> Result<(i64, String), AppError> {
    let existing = sqlx::query_as::<_, (i64, String)>(
        r#"SELECT id, name FROM departments WHERE name = $1"#,
    )
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((id, name)) = existing {
        return Ok((id, name));
    }

    let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM departments"#)
        .fetch_one(&mut **tx)
        .await?;
    let code = format!("PB-{:03}", count + 1);

    let id: i64 = sqlx::query_scalar(
        r#"INSERT INTO departments (code, name) VALUES ($1, $2) RETURNING id"#,
    )
    .bind(&code)
    .bind(name)
    .fetch_one(&mut **tx)
    .await?;

    Ok((id, name.to_string()))
}

// ==================== Get Issue ====================

#[derive(FromRow)]
struct IssueHeaderRow {
    id: i64,
    issue_code: String,
    warehouse_id: i64,
    department_id: i64,
    department_name: String,
    issue_date: NaiveDate,
    notes: Option<String>,
    status: String,
    total_amount: f64,
    created_by: i64,
    confirmed_by: Option<i64>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct IssueDetailRow {
    id: i64,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price: f64,
    line_total: f64,
}

#[derive(FromRow)]
struct AllocationRow {
    detail_id: i64,
    lot_id: i64,
    lot_number: String,
    expiry_date: Option<NaiveDate>,
    quantity: i32,
    unit_cost: f64,
}

pub async fn get_issue(
    State(AppState { db_pool }): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<IssueResponse>, AppError> {
    let header = sqlx::query_as::<_, IssueHeaderRow>(
        r#"SELECT i.id, i.issue_code, i.warehouse_id, i.department_id,
                  d.name as department_name, i.issue_date, i.notes, i.status,
                  (i.total_amount)::FLOAT8 as total_amount, i.created_by,
                  i.confirmed_by, i.confirmed_at, i.created_at
           FROM inventory_issues i
           JOIN departments d ON i.department_id = d.id
           WHERE i.id = $1"#,
    )
    .bind(id)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("inventory issue not found: {id}")))?;

    let details = sqlx::query_as::<_, IssueDetailRow>(
        r#"SELECT dt.id, dt.product_id, p.name as product_name, dt.quantity,
                  (dt.unit_price)::FLOAT8 as unit_price,
                  (dt.line_total)::FLOAT8 as line_total
           FROM inventory_issue_details dt
           JOIN products p ON dt.product_id = p.id
           WHERE dt.issue_id = $1
           ORDER BY dt.line_no ASC"#,
    )
    .bind(id)
    .fetch_all(&db_pool)
    .await?;

    let allocations = sqlx::query_as::<_, AllocationRow>(
        r#"SELECT a.detail_id, a.lot_id, a.lot_number, a.expiry_date,
                  a.quantity, (a.unit_cost)::FLOAT8 as unit_cost
           FROM issue_lot_allocations a
           JOIN inventory_issue_details dt ON a.detail_id = dt.id
           WHERE dt.issue_id = $1
           ORDER BY a.id ASC"#,
    )
    .bind(id)
    .fetch_all(&db_pool)
    .await?;

    let detail_responses = details
        .into_iter()
        .map(|detail| {
            let lot_allocations = allocations
                .iter()
                .filter(|a| a.detail_id == detail.id)
                .map(|a| AllocationResponse {
                    lot_id: a.lot_id,
                    lot_number: a.lot_number.clone(),
                    expiry_date: a.expiry_date,
                    quantity: a.quantity,
                    unit_cost: a.unit_cost,
                })
                .collect();
            IssueDetailResponse {
                id: detail.id,
                product_id: detail.product_id,
                product_name: detail.product_name,
                quantity: detail.quantity,
                unit_price: detail.unit_price,
                line_total: detail.line_total,
                lot_allocations,
            }
        })
        .collect();

    Ok(Json(IssueResponse {
        id: header.id,
        issue_code: header.issue_code,
        warehouse_id: header.warehouse_id,
        department_id: header.department_id,
        department: header.department_name,
        issue_date: header.issue_date,
        notes: header.notes,
        status: header.status,
        total_amount: header.total_amount,
        created_by: header.created_by,
        confirmed_by: header.confirmed_by,
        confirmed_at: header.confirmed_at,
        created_at: header.created_at,
        details: detail_responses,
    }))
}

// ==================== List Issues ====================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueListQuery {
    pub warehouse_id: Option<i64>,
    pub department_id: Option<i64>,
    pub issue_date: Option<NaiveDate>,
}

pub async fn list_issues(
    State(AppState { db_pool }): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    Query(params): Query<IssueListQuery>,
) -> Result<Json<Vec<IssueListItem>>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, i64, String, NaiveDate, String, f64, i64, DateTime<Utc>)>(
        r#"SELECT i.id, i.issue_code, i.warehouse_id, d.name, i.issue_date,
                  i.status, (i.total_amount)::FLOAT8, COUNT(dt.id), i.created_at
           FROM inventory_issues i
           JOIN departments d ON i.department_id = d.id
           LEFT JOIN inventory_issue_details dt ON dt.issue_id = i.id
           WHERE ($1::BIGINT IS NULL OR i.warehouse_id = $1)
             AND ($2::BIGINT IS NULL OR i.department_id = $2)
             AND ($3::DATE IS NULL OR i.issue_date = $3)
           GROUP BY i.id, d.name
           ORDER BY i.issue_date DESC, i.id DESC"#,
    )
    .bind(params.warehouse_id)
    .bind(params.department_id)
    .bind(params.issue_date)
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(
                |(id, issue_code, warehouse_id, department, issue_date, status, total_amount, total_items, created_at)| {
                    IssueListItem {
                        id,
                        issue_code,
                        warehouse_id,
                        department,
                        issue_date,
                        status,
                        total_amount,
                        total_items,
                        created_at,
                    }
                },
            )
            .collect(),
    ))
}

// ==================== Product Suggestions ====================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionQuery {
    pub warehouse_id: i64,
    pub q: Option<String>,
}

/// Read-only helper for the issuing UI: products matching the search term
/// with their computed availability and the nearest-expiry lot's pricing.
/// Products without any eligible lot come back with zero-valued defaults.
pub async fn product_suggestions(
    State(AppState { db_pool }): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    Query(params): Query<SuggestionQuery>,
) -> Result<Json<Vec<ProductSuggestion>>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, Option<i64>, Option<f64>, Option<NaiveDate>, Option<String>)>(
        r#"SELECT p.id, p.sku, p.name, p.unit,
                  agg.available, near.unit_cost, near.expiry_date, near.lot_number
           FROM products p
           LEFT JOIN LATERAL (
               SELECT SUM(l.quantity)::BIGINT as available
               FROM inventory_lots l
               WHERE l.product_id = p.id AND l.warehouse_id = $1
                 AND l.quantity > 0
                 AND (l.expiry_date IS NULL OR l.expiry_date >= CURRENT_DATE)
           ) agg ON TRUE
           LEFT JOIN LATERAL (
               SELECT (l.unit_cost)::FLOAT8 as unit_cost, l.expiry_date, l.lot_number
               FROM inventory_lots l
               WHERE l.product_id = p.id AND l.warehouse_id = $1
                 AND l.quantity > 0
                 AND (l.expiry_date IS NULL OR l.expiry_date >= CURRENT_DATE)
               ORDER BY l.expiry_date ASC NULLS LAST, l.created_at ASC
               LIMIT 1
           ) near ON TRUE
           WHERE ($2::TEXT IS NULL OR p.name ILIKE '%' || $2 || '%' OR p.sku ILIKE '%' || $2 || '%')
           ORDER BY p.name ASC
           LIMIT 20"#,
    )
    .bind(params.warehouse_id)
    .bind(params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()))
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(product_id, sku, name, unit, available, unit_cost, expiry_date, lot_number)| {
                ProductSuggestion {
                    product_id,
                    sku,
                    name,
                    unit,
                    available_quantity: available.unwrap_or(0) as i32,
                    unit_price: unit_cost.unwrap_or(0.0),
                    expiry_date,
                    lot_number,
                }
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn suggestion_query_uses_camel_case_keys() {
        let query: SuggestionQuery =
            serde_json::from_value(json!({ "warehouseId": 3, "q": "para" })).unwrap();
        assert_eq!(query.warehouse_id, 3);
        assert_eq!(query.q.as_deref(), Some("para"));
    }

    #[test]
    fn issue_list_query_uses_camel_case_keys() {
        let query: IssueListQuery = serde_json::from_value(json!({
            "warehouseId": 3,
            "departmentId": 9,
            "issueDate": "2025-06-01"
        }))
        .unwrap();
        assert_eq!(query.warehouse_id, Some(3));
        assert_eq!(query.department_id, Some(9));
        assert_eq!(
            query.issue_date,
            Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
        );
    }
}
