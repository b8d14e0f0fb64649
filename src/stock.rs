// src/stock.rs
//
// Pure allocation logic for outbound issues: FEFO lot planning and the
// aggregate availability pre-check. Database-free so it can be tested
// directly; handlers feed it rows fetched inside the request transaction.

use chrono::NaiveDate;
use serde::Serialize;

/// A lot as seen by the allocator. Callers supply lots in creation order
/// (oldest first); ties on expiry date keep that order.
#[derive(Debug, Clone)]
pub struct EligibleLot {
    pub id: i64,
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub unit_cost: f64,
}

/// One entry of a FEFO pick list.
#[derive(Debug, Clone, PartialEq)]
pub struct LotPick {
    pub lot_id: i64,
    pub quantity: i32,
}

#[derive(Debug, PartialEq)]
pub enum FefoError {
    /// Total eligible stock is below the requested quantity. No partial
    /// fulfillment: the whole line fails.
    NotEnough { available: i32, requested: i32 },
}

/// First-expired-first-out planning for a single line.
///
/// Lots with no expiry date are treated as never-expiring and sort last.
/// Already-expired lots and empty lots are skipped. Greedy consumption:
/// min(remaining, lot.quantity) per lot until the request is covered.
pub fn plan_fefo(
    lots: &[EligibleLot],
    needed: i32,
    today: NaiveDate,
) -> Result<Vec<LotPick>, FefoError> {
    let mut candidates: Vec<&EligibleLot> = lots
        .iter()
        .filter(|lot| lot.quantity > 0)
        .filter(|lot| match lot.expiry_date {
            Some(expiry) => expiry >= today,
            None => true,
        })
        .collect();

    // Stable sort keeps creation order for equal expiry dates.
    candidates.sort_by_key(|lot| lot.expiry_date.unwrap_or(NaiveDate::MAX));

    let available: i32 = candidates.iter().map(|lot| lot.quantity).sum();
    if available < needed {
        return Err(FefoError::NotEnough { available, requested: needed });
    }

    let mut picks = Vec::new();
    let mut remaining = needed;
    for lot in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.quantity);
        picks.push(LotPick { lot_id: lot.id, quantity: take });
        remaining -= take;
    }

    Ok(picks)
}

/// Aggregate demand for one product, with the summed availability the
/// handler computed across that product's eligible lots.
#[derive(Debug, Clone)]
pub struct ProductDemand {
    pub product_id: i64,
    pub product_name: String,
    pub requested: i32,
    pub available: i32,
}

/// Structured shortage record returned in the error payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StockShortage {
    pub product_id: i64,
    pub product_name: String,
    pub requested: i32,
    pub available: i32,
    pub shortage: i32,
    pub message: String,
}

/// Advisory pre-check: flags every product whose aggregate availability is
/// below the requested quantity. Empty result means all lines are satisfiable
/// at check time. Does not reserve stock; the guarded decrement later in the
/// transaction is the authoritative check.
pub fn find_shortages(demands: &[ProductDemand]) -> Vec<StockShortage> {
    demands
        .iter()
        .filter(|d| d.available < d.requested)
        .map(|d| {
            let shortage = d.requested - d.available;
            StockShortage {
                product_id: d.product_id,
                product_name: d.product_name.clone(),
                requested: d.requested,
                available: d.available,
                shortage,
                message: format!(
                    "insufficient stock for '{}': available {}, requested {}",
                    d.product_name, d.available, d.requested
                ),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(id: i64, expiry: Option<NaiveDate>, quantity: i32) -> EligibleLot {
        EligibleLot {
            id,
            lot_number: format!("LOT-{id}"),
            expiry_date: expiry,
            quantity,
            unit_cost: 1000.0,
        }
    }

    const TODAY: fn() -> NaiveDate = || date(2025, 6, 1);

    #[test]
    fn fefo_picks_soonest_expiry_first() {
        let lots = vec![
            lot(1, Some(date(2026, 3, 1)), 40),
            lot(2, Some(date(2026, 1, 1)), 60),
        ];
        let picks = plan_fefo(&lots, 100, TODAY()).unwrap();
        assert_eq!(
            picks,
            vec![
                LotPick { lot_id: 2, quantity: 60 },
                LotPick { lot_id: 1, quantity: 40 },
            ]
        );
    }

    #[test]
    fn fefo_partial_pick_from_second_lot() {
        let lots = vec![
            lot(1, Some(date(2026, 1, 1)), 60),
            lot(2, Some(date(2026, 3, 1)), 40),
        ];
        let picks = plan_fefo(&lots, 70, TODAY()).unwrap();
        assert_eq!(
            picks,
            vec![
                LotPick { lot_id: 1, quantity: 60 },
                LotPick { lot_id: 2, quantity: 10 },
            ]
        );
        assert_eq!(picks.iter().map(|p| p.quantity).sum::<i32>(), 70);
    }

    #[test]
    fn fefo_never_prefers_undated_lot_over_dated() {
        let lots = vec![
            lot(1, None, 100),
            lot(2, Some(date(2027, 12, 31)), 5),
        ];
        let picks = plan_fefo(&lots, 10, TODAY()).unwrap();
        assert_eq!(picks[0].lot_id, 2);
        assert_eq!(picks[0].quantity, 5);
        assert_eq!(picks[1].lot_id, 1);
        assert_eq!(picks[1].quantity, 5);
    }

    #[test]
    fn fefo_tie_break_keeps_creation_order() {
        let same_day = Some(date(2026, 1, 1));
        let lots = vec![lot(10, same_day, 30), lot(11, same_day, 30)];
        let picks = plan_fefo(&lots, 40, TODAY()).unwrap();
        assert_eq!(picks[0].lot_id, 10);
        assert_eq!(picks[0].quantity, 30);
        assert_eq!(picks[1].lot_id, 11);
        assert_eq!(picks[1].quantity, 10);
    }

    #[test]
    fn fefo_skips_expired_and_empty_lots() {
        let lots = vec![
            lot(1, Some(date(2025, 5, 31)), 50), // expired yesterday
            lot(2, Some(date(2026, 1, 1)), 0),   // drained
            lot(3, Some(date(2026, 1, 1)), 20),
        ];
        let picks = plan_fefo(&lots, 20, TODAY()).unwrap();
        assert_eq!(picks, vec![LotPick { lot_id: 3, quantity: 20 }]);
    }

    #[test]
    fn fefo_expiring_today_is_still_eligible() {
        let lots = vec![lot(1, Some(TODAY()), 10)];
        let picks = plan_fefo(&lots, 10, TODAY()).unwrap();
        assert_eq!(picks, vec![LotPick { lot_id: 1, quantity: 10 }]);
    }

    #[test]
    fn fefo_fails_without_partial_pick_when_stock_short() {
        let lots = vec![
            lot(1, Some(date(2026, 1, 1)), 30),
            lot(2, Some(date(2025, 1, 1)), 500), // expired, does not count
        ];
        let err = plan_fefo(&lots, 100, TODAY()).unwrap_err();
        assert_eq!(err, FefoError::NotEnough { available: 30, requested: 100 });
    }

    #[test]
    fn shortage_check_passes_when_stock_covers_demand() {
        let demands = vec![ProductDemand {
            product_id: 1,
            product_name: "Paracetamol 500mg".into(),
            requested: 100,
            available: 100,
        }];
        assert!(find_shortages(&demands).is_empty());
    }

    #[test]
    fn shortage_check_reports_each_short_product() {
        let demands = vec![
            ProductDemand {
                product_id: 1,
                product_name: "Paracetamol 500mg".into(),
                requested: 100,
                available: 40,
            },
            ProductDemand {
                product_id: 2,
                product_name: "Amoxicillin 250mg".into(),
                requested: 10,
                available: 200,
            },
        ];
        let shortages = find_shortages(&demands);
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].product_id, 1);
        assert_eq!(shortages[0].shortage, 60);
        assert_eq!(
            shortages[0].message,
            "insufficient stock for 'Paracetamol 500mg': available 40, requested 100"
        );
    }
}
