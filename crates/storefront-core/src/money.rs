//! Money helpers.
//!
//! All amounts are integer cents (`i64`) to avoid floating point drift.

/// Compute `percent`% of `amount_cents`, rounded half-up to the cent.
///
/// Saturates at `i64::MAX` for percentages above 100 on huge amounts.
#[must_use]
pub fn percent_of(amount_cents: i64, percent: u32) -> i64 {
    if amount_cents <= 0 {
        return 0;
    }
    let scaled = (i128::from(amount_cents) * i128::from(percent) + 50) / 100;
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

/// Format cents as a dollar string, e.g. `4500` -> `"$45.00"`.
#[must_use]
pub fn format_cents(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent_of(5000, 10), 500);
        assert_eq!(percent_of(4500, 3), 135);
        assert_eq!(percent_of(1650, 3), 50); // 49.5 -> 50
        assert_eq!(percent_of(1649, 3), 49);
        assert_eq!(percent_of(0, 3), 0);
    }

    #[test]
    fn percent_of_large_amounts_does_not_overflow() {
        assert_eq!(percent_of(i64::MAX, 100), i64::MAX);
        assert_eq!(percent_of(i64::MAX, 10), i64::MAX / 10 + 1);
        assert_eq!(percent_of(i64::MAX, 1_000), i64::MAX);
    }

    #[test]
    fn formats_dollars() {
        assert_eq!(format_cents(4500), "$45.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(-1234), "-$12.34");
    }
}
