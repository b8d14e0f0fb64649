// src/dtos/inventory_issue.rs
//
// The create-issue body is parsed by hand from raw JSON instead of a typed
// serde struct: the endpoint accepts two line-item shapes (`items` for
// auto-FEFO, `details` for manual lot allocation), must tell "absent" from
// "wrong type" from "empty", and reports gate failures in a fixed order with
// 1-based line numbers. Both shapes normalize into `IssueLine`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct ManualAllocation {
    pub inventory_lot_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct IssueLine {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: f64,
    /// None = FEFO auto-allocation; Some = caller-chosen split, authoritative.
    pub allocations: Option<Vec<ManualAllocation>>,
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub warehouse_id: i64,
    pub department: String,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    pub lines: Vec<IssueLine>,
}

/// Sequential gate checks; the first failing gate wins so error reporting is
/// deterministic. A quantity of exactly zero reports "required" rather than
/// "invalid" — compatibility with the behavior existing clients depend on.
pub fn parse_issue_request(body: &Value) -> Result<IssueRequest, AppError> {
    let warehouse_id = body
        .get("warehouseId")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::validation("warehouse is required"))?;

    let department = body
        .get("department")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::validation("department is required"))?
        .to_string();

    let issue_date_raw = body
        .get("issueDate")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::validation("issue date is required"))?;
    let issue_date = NaiveDate::parse_from_str(issue_date_raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation("issue date is invalid"))?;

    let notes = body
        .get("notes")
        .and_then(Value::as_str)
        .map(|n| n.to_string());

    // `details` (manual-capable) takes precedence when both shapes are sent;
    // an explicit null is the same as leaving the key out.
    let details = body.get("details").filter(|v| !v.is_null());
    let items = body.get("items").filter(|v| !v.is_null());
    let (collection, quantity_key, manual) = match (details, items) {
        (Some(details), _) => (details, "totalQuantity", true),
        (None, Some(items)) => (items, "quantity", false),
        (None, None) => return Err(AppError::validation("items are required")),
    };

    let rows = collection
        .as_array()
        .ok_or_else(|| AppError::validation("items must be an array"))?;
    if rows.is_empty() {
        return Err(AppError::validation("items must not be empty"));
    }

    let mut lines = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let line_no = idx + 1;
        lines.push(parse_line(row, line_no, quantity_key, manual)?);
    }

    Ok(IssueRequest { warehouse_id, department, issue_date, notes, lines })
}

fn parse_line(
    row: &Value,
    line_no: usize,
    quantity_key: &str,
    manual: bool,
) -> Result<IssueLine, AppError> {
    let row = row
        .as_object()
        .ok_or_else(|| AppError::validation(format!("item must be an object (line {line_no})")))?;

    let product_id = row
        .get("productId")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::validation(format!("product id is required (line {line_no})")))?;

    let quantity = match row.get(quantity_key) {
        None | Some(Value::Null) => {
            return Err(AppError::validation(format!("quantity is required (line {line_no})")))
        }
        Some(v) => match v.as_i64() {
            // Zero falls through the presence check, by compatibility.
            Some(0) => {
                return Err(AppError::validation(format!("quantity is required (line {line_no})")))
            }
            Some(q) if q < 0 => {
                return Err(AppError::validation(format!("quantity is invalid (line {line_no})")))
            }
            // Out-of-range values must not wrap into a small or negative
            // quantity.
            Some(q) => i32::try_from(q).map_err(|_| {
                AppError::validation(format!("quantity is invalid (line {line_no})"))
            })?,
            None => {
                return Err(AppError::validation(format!("quantity is invalid (line {line_no})")))
            }
        },
    };

    let unit_price = match row.get("unitPrice") {
        None | Some(Value::Null) => {
            return Err(AppError::validation(format!("unit price is required (line {line_no})")))
        }
        Some(v) => match v.as_f64() {
            Some(p) if p < 0.0 => {
                return Err(AppError::validation(format!("unit price is invalid (line {line_no})")))
            }
            Some(p) => p,
            None => {
                return Err(AppError::validation(format!("unit price is invalid (line {line_no})")))
            }
        },
    };

    let allocations = if manual {
        match row.get("lotAllocations") {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_allocations(v, line_no, quantity)?),
        }
    } else {
        None
    };

    Ok(IssueLine { product_id, quantity, unit_price, allocations })
}

fn parse_allocations(
    value: &Value,
    line_no: usize,
    line_quantity: i32,
) -> Result<Vec<ManualAllocation>, AppError> {
    let rows = value.as_array().ok_or_else(|| {
        AppError::validation(format!("lot allocations must be an array (line {line_no})"))
    })?;
    if rows.is_empty() {
        return Err(AppError::validation(format!(
            "lot allocations must not be empty (line {line_no})"
        )));
    }

    let mut allocations = Vec::with_capacity(rows.len());
    for row in rows {
        let inventory_lot_id = row.get("inventoryLotId").and_then(Value::as_i64).ok_or_else(|| {
            AppError::validation(format!("lot allocation lot id is required (line {line_no})"))
        })?;
        let quantity = row
            .get("quantity")
            .and_then(Value::as_i64)
            .filter(|q| *q > 0)
            .and_then(|q| i32::try_from(q).ok())
            .ok_or_else(|| {
                AppError::validation(format!(
                    "lot allocation quantity is invalid (line {line_no})"
                ))
            })?;
        allocations.push(ManualAllocation { inventory_lot_id, quantity });
    }

    let allocated: i32 = allocations.iter().map(|a| a.quantity).sum();
    if allocated != line_quantity {
        return Err(AppError::validation(format!(
            "lot allocations must sum to the line quantity; allocated: {allocated}, quantity: {line_quantity} (line {line_no})"
        )));
    }

    Ok(allocations)
}

/// Total demand per lot for a caller-chosen split, in first-seen order.
/// Duplicate entries against one lot are summed so the quantity check runs
/// against the lot's whole demand, not each entry against the same snapshot.
pub fn sum_allocations_by_lot(allocations: &[ManualAllocation]) -> Vec<(i64, i32)> {
    let mut order: Vec<i64> = Vec::new();
    let mut totals: std::collections::HashMap<i64, i32> = std::collections::HashMap::new();
    for allocation in allocations {
        let entry = totals.entry(allocation.inventory_lot_id).or_insert_with(|| {
            order.push(allocation.inventory_lot_id);
            0
        });
        *entry += allocation.quantity;
    }
    order.into_iter().map(|lot_id| (lot_id, totals[&lot_id])).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub id: i64,
    pub issue_code: String,
    pub warehouse_id: i64,
    pub department_id: i64,
    pub department: String,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    pub status: String,
    pub total_amount: f64,
    pub created_by: i64,
    pub confirmed_by: Option<i64>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub details: Vec<IssueDetailResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDetailResponse {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub line_total: f64,
    pub lot_allocations: Vec<AllocationResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResponse {
    pub lot_id: i64,
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub unit_cost: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueListItem {
    pub id: i64,
    pub issue_code: String,
    pub warehouse_id: i64,
    pub department: String,
    pub issue_date: NaiveDate,
    pub status: String,
    pub total_amount: f64,
    pub total_items: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSuggestion {
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub available_quantity: i32,
    pub unit_price: f64,
    pub expiry_date: Option<NaiveDate>,
    pub lot_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(err: AppError) -> String {
        match err {
            AppError::Validation(m) => m,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn valid_body() -> Value {
        json!({
            "warehouseId": 1,
            "department": "Khoa Nội",
            "issueDate": "2025-06-01",
            "items": [
                { "productId": 10, "quantity": 100, "unitPrice": 5000.0 }
            ]
        })
    }

    #[test]
    fn accepts_simple_shape() {
        let req = parse_issue_request(&valid_body()).unwrap();
        assert_eq!(req.warehouse_id, 1);
        assert_eq!(req.department, "Khoa Nội");
        assert_eq!(req.issue_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(req.lines.len(), 1);
        assert_eq!(req.lines[0].product_id, 10);
        assert_eq!(req.lines[0].quantity, 100);
        assert_eq!(req.lines[0].unit_price, 5000.0);
        assert!(req.lines[0].allocations.is_none());
    }

    #[test]
    fn accepts_manual_shape_with_allocations() {
        let body = json!({
            "warehouseId": 1,
            "department": "Khoa Dược",
            "issueDate": "2025-06-01",
            "details": [{
                "productId": 10,
                "totalQuantity": 30,
                "unitPrice": 1200.0,
                "lotAllocations": [
                    { "inventoryLotId": 7, "quantity": 20 },
                    { "inventoryLotId": 8, "quantity": 10 }
                ]
            }]
        });
        let req = parse_issue_request(&body).unwrap();
        let allocations = req.lines[0].allocations.as_ref().unwrap();
        assert_eq!(
            allocations,
            &vec![
                ManualAllocation { inventory_lot_id: 7, quantity: 20 },
                ManualAllocation { inventory_lot_id: 8, quantity: 10 },
            ]
        );
    }

    #[test]
    fn detail_line_without_allocations_falls_back_to_fefo() {
        let body = json!({
            "warehouseId": 1,
            "department": "Khoa Nội",
            "issueDate": "2025-06-01",
            "details": [
                { "productId": 10, "totalQuantity": 30, "unitPrice": 1200.0 }
            ]
        });
        let req = parse_issue_request(&body).unwrap();
        assert!(req.lines[0].allocations.is_none());
    }

    #[test]
    fn missing_warehouse_short_circuits_first() {
        let body = json!({ "department": "", "issueDate": null });
        assert_eq!(msg(parse_issue_request(&body).unwrap_err()), "warehouse is required");
    }

    #[test]
    fn blank_department_is_rejected_after_trim() {
        let mut body = valid_body();
        body["department"] = json!("   ");
        assert_eq!(msg(parse_issue_request(&body).unwrap_err()), "department is required");
    }

    #[test]
    fn department_is_trimmed() {
        let mut body = valid_body();
        body["department"] = json!("  Khoa Nội  ");
        assert_eq!(parse_issue_request(&body).unwrap().department, "Khoa Nội");
    }

    #[test]
    fn missing_issue_date() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("issueDate");
        assert_eq!(msg(parse_issue_request(&body).unwrap_err()), "issue date is required");
    }

    #[test]
    fn absent_items_vs_wrong_type_vs_empty() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("items");
        assert_eq!(msg(parse_issue_request(&body).unwrap_err()), "items are required");

        let mut body = valid_body();
        body["items"] = json!("not-an-array");
        assert_eq!(msg(parse_issue_request(&body).unwrap_err()), "items must be an array");

        let mut body = valid_body();
        body["items"] = json!([]);
        assert_eq!(msg(parse_issue_request(&body).unwrap_err()), "items must not be empty");
    }

    #[test]
    fn line_errors_carry_one_based_line_numbers() {
        let mut body = valid_body();
        body["items"] = json!([
            { "productId": 10, "quantity": 5, "unitPrice": 100.0 },
            { "quantity": 5, "unitPrice": 100.0 }
        ]);
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "product id is required (line 2)"
        );
    }

    #[test]
    fn zero_quantity_reports_required_not_invalid() {
        let mut body = valid_body();
        body["items"] = json!([{ "productId": 10, "quantity": 0, "unitPrice": 100.0 }]);
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "quantity is required (line 1)"
        );
    }

    #[test]
    fn negative_quantity_is_invalid() {
        let mut body = valid_body();
        body["items"] = json!([{ "productId": 10, "quantity": -3, "unitPrice": 100.0 }]);
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "quantity is invalid (line 1)"
        );
    }

    #[test]
    fn missing_and_negative_unit_price() {
        let mut body = valid_body();
        body["items"] = json!([{ "productId": 10, "quantity": 5 }]);
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "unit price is required (line 1)"
        );

        let mut body = valid_body();
        body["items"] = json!([{ "productId": 10, "quantity": 5, "unitPrice": -1.0 }]);
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "unit price is invalid (line 1)"
        );
    }

    #[test]
    fn zero_unit_price_is_accepted() {
        let mut body = valid_body();
        body["items"] = json!([{ "productId": 10, "quantity": 5, "unitPrice": 0.0 }]);
        assert!(parse_issue_request(&body).is_ok());
    }

    #[test]
    fn allocations_must_sum_to_line_quantity() {
        let body = json!({
            "warehouseId": 1,
            "department": "Khoa Nội",
            "issueDate": "2025-06-01",
            "details": [{
                "productId": 10,
                "totalQuantity": 30,
                "unitPrice": 1200.0,
                "lotAllocations": [{ "inventoryLotId": 7, "quantity": 20 }]
            }]
        });
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "lot allocations must sum to the line quantity; allocated: 20, quantity: 30 (line 1)"
        );
    }

    #[test]
    fn allocation_quantity_must_be_positive() {
        let body = json!({
            "warehouseId": 1,
            "department": "Khoa Nội",
            "issueDate": "2025-06-01",
            "details": [{
                "productId": 10,
                "totalQuantity": 30,
                "unitPrice": 1200.0,
                "lotAllocations": [{ "inventoryLotId": 7, "quantity": 0 }]
            }]
        });
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "lot allocation quantity is invalid (line 1)"
        );
    }

    #[test]
    fn oversized_quantity_is_invalid_not_wrapped() {
        // 2^32 + 5 must not truncate to 5.
        let mut body = valid_body();
        body["items"] = json!([{ "productId": 10, "quantity": 4294967301i64, "unitPrice": 100.0 }]);
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "quantity is invalid (line 1)"
        );

        // 2^32 - 5 must not wrap to -5 and slip past the negative gate.
        let mut body = valid_body();
        body["items"] = json!([{ "productId": 10, "quantity": 4294967291i64, "unitPrice": 100.0 }]);
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "quantity is invalid (line 1)"
        );
    }

    #[test]
    fn oversized_allocation_quantity_is_invalid() {
        let body = json!({
            "warehouseId": 1,
            "department": "Khoa Nội",
            "issueDate": "2025-06-01",
            "details": [{
                "productId": 10,
                "totalQuantity": 30,
                "unitPrice": 1200.0,
                "lotAllocations": [{ "inventoryLotId": 7, "quantity": 4294967321i64 }]
            }]
        });
        assert_eq!(
            msg(parse_issue_request(&body).unwrap_err()),
            "lot allocation quantity is invalid (line 1)"
        );
    }

    #[test]
    fn null_details_falls_back_to_items() {
        let mut body = valid_body();
        body["details"] = json!(null);
        let req = parse_issue_request(&body).unwrap();
        assert_eq!(req.lines.len(), 1);
        assert_eq!(req.lines[0].product_id, 10);
        assert!(req.lines[0].allocations.is_none());
    }

    #[test]
    fn allocation_sums_merge_duplicate_lots_in_order() {
        let allocations = vec![
            ManualAllocation { inventory_lot_id: 7, quantity: 20 },
            ManualAllocation { inventory_lot_id: 9, quantity: 5 },
            ManualAllocation { inventory_lot_id: 7, quantity: 40 },
        ];
        assert_eq!(sum_allocations_by_lot(&allocations), vec![(7, 60), (9, 5)]);
    }

    #[test]
    fn details_take_precedence_over_items() {
        let body = json!({
            "warehouseId": 1,
            "department": "Khoa Nội",
            "issueDate": "2025-06-01",
            "items": [{ "productId": 1, "quantity": 1, "unitPrice": 1.0 }],
            "details": [{ "productId": 2, "totalQuantity": 2, "unitPrice": 2.0 }]
        });
        let req = parse_issue_request(&body).unwrap();
        assert_eq!(req.lines.len(), 1);
        assert_eq!(req.lines[0].product_id, 2);
    }
}
