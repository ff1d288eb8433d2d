//! Money and text input validation
//!
//! All amounts are `Decimal` with at most [`MONEY_SCALE`] fractional digits,
//! stored as `NUMERIC(18,2)`. Input is rejected, never rounded: a price of
//! `"1.005"` is an error, not `1.00` or `1.01`.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{MarketError, MarketResult};

/// Fractional digits for every monetary column
pub const MONEY_SCALE: u32 = 2;

/// Largest value a `NUMERIC(18,2)` column holds
pub fn max_amount() -> Decimal {
    Decimal::new(9_999_999_999_999_999_99, MONEY_SCALE)
}

/// Parse a user-typed price or amount
///
/// Accepts `,` as decimal separator (`"12,50"`).
pub fn parse_amount(input: &str) -> MarketResult<Decimal> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return Err(MarketError::validation("amount is empty"));
    }
    if normalized.starts_with('+') || normalized.starts_with('-') {
        return Err(MarketError::validation("amount must be a plain positive number"));
    }
    let value = Decimal::from_str(&normalized)
        .map_err(|_| MarketError::validation(format!("not a number: {}", input.trim())))?;
    validate_amount(value)
}

/// Check an amount that already is a `Decimal`
pub fn validate_amount(value: Decimal) -> MarketResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(MarketError::validation("amount must be greater than zero"));
    }
    if value.normalize().scale() > MONEY_SCALE {
        return Err(MarketError::validation(format!(
            "amount has more than {} decimal places",
            MONEY_SCALE
        )));
    }
    if value > max_amount() {
        return Err(MarketError::validation("amount is too large"));
    }
    let mut value = value;
    value.rescale(MONEY_SCALE);
    Ok(value)
}

/// Trimmed, non-empty free text (titles, descriptions, requisites)
pub fn non_empty_text(field: &str, input: &str) -> MarketResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MarketError::validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
