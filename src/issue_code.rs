// src/issue_code.rs
use chrono::NaiveDate;

/// Issue codes are date-scoped with a daily-reset 3-digit sequence:
/// `PX-YYYYMMDD-NNN`. The sequence is count-of-today's-issues + 1, read
/// inside the request transaction; a UNIQUE constraint on the column backs
/// up the residual race between concurrent same-day issues.
pub fn issue_code(date: NaiveDate, sequence: i64) -> String {
    format!("PX-{}-{:03}", date.format("%Y%m%d"), sequence)
}

/// LIKE pattern matching every code minted on the given day.
pub fn day_prefix(date: NaiveDate) -> String {
    format!("PX-{}-%", date.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn code_is_zero_padded_and_date_scoped() {
        assert_eq!(issue_code(date(2025, 6, 1), 1), "PX-20250601-001");
        assert_eq!(issue_code(date(2025, 6, 1), 42), "PX-20250601-042");
        assert_eq!(issue_code(date(2025, 12, 31), 999), "PX-20251231-999");
    }

    #[test]
    fn sequence_past_three_digits_still_renders() {
        assert_eq!(issue_code(date(2025, 6, 1), 1000), "PX-20250601-1000");
    }

    #[test]
    fn day_prefix_matches_code_shape() {
        assert_eq!(day_prefix(date(2025, 6, 1)), "PX-20250601-%");
    }
}
