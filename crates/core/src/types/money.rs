//! Fixed-point money helpers.
//!
//! All currency amounts in Greenstem are `rust_decimal::Decimal` values in
//! the currency's natural unit (e.g., `19.99` dollars), stored in Postgres
//! as `NUMERIC`. Payment APIs expect integer minor units (cents), so the
//! conversion happens exactly once, at that boundary, via the functions in
//! this module. Binary floating point never touches a price.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Errors that can occur when converting money values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is negative.
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    /// The amount does not fit in an i64 once expressed in minor units.
    #[error("amount out of range: {0}")]
    OutOfRange(Decimal),
}

/// Convert a decimal amount to integer minor units (cents).
///
/// Rounds to the nearest cent using banker's rounding, matching how
/// `NUMERIC(10, 2)` columns behave. Amounts must be non-negative.
///
/// # Errors
///
/// Returns `MoneyError::Negative` for negative amounts and
/// `MoneyError::OutOfRange` if the result does not fit in an `i64`.
///
/// # Examples
///
/// ```
/// use greenstem_core::to_minor_units;
/// use rust_decimal::Decimal;
///
/// assert_eq!(to_minor_units(Decimal::new(2300, 2)).unwrap(), 2300);
/// assert_eq!(to_minor_units(Decimal::new(1999, 2)).unwrap(), 1999);
/// ```
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative(amount));
    }

    let cents = (amount * Decimal::ONE_HUNDRED).round();
    cents.to_i64().ok_or(MoneyError::OutOfRange(amount))
}

/// Convert integer minor units (cents) to a decimal amount.
///
/// # Examples
///
/// ```
/// use greenstem_core::from_minor_units;
/// use rust_decimal::Decimal;
///
/// assert_eq!(from_minor_units(2300), Decimal::new(2300, 2));
/// ```
#[must_use]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Format a decimal amount as a USD display string, e.g. `$19.99`.
#[must_use]
pub fn format_usd(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minor_units_exact() {
        assert_eq!(to_minor_units(Decimal::new(1000, 2)).expect("10.00"), 1000);
        assert_eq!(to_minor_units(Decimal::ZERO).expect("0"), 0);
    }

    #[test]
    fn test_to_minor_units_rounds_sub_cent() {
        // 1.005 -> 100 (banker's rounding, ties to even)
        assert_eq!(to_minor_units(Decimal::new(1005, 3)).expect("1.005"), 100);
        // 1.015 -> 102
        assert_eq!(to_minor_units(Decimal::new(1015, 3)).expect("1.015"), 102);
    }

    #[test]
    fn test_to_minor_units_negative() {
        let err = to_minor_units(Decimal::new(-100, 2)).expect_err("negative");
        assert!(matches!(err, MoneyError::Negative(_)));
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(from_minor_units(2300), Decimal::new(23, 0));
        assert_eq!(from_minor_units(1), Decimal::new(1, 2));
    }

    #[test]
    fn test_minor_unit_roundtrip() {
        let amount = Decimal::new(4499, 2);
        let minor = to_minor_units(amount).expect("44.99");
        assert_eq!(from_minor_units(minor), amount);
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(Decimal::new(1999, 2)), "$19.99");
        assert_eq!(format_usd(Decimal::new(3, 0)), "$3.00");
        assert_eq!(format_usd(Decimal::ZERO), "$0.00");
    }
}
