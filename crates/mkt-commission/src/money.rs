//! Decimal money helpers.
//!
//! # Representation
//!
//! Every monetary amount in this crate is a [`rust_decimal::Decimal`].
//! Binary floating point is never used for money: `0.1 + 0.2` must be
//! `0.3`, not `0.30000000000000004`.
//!
//! Rates are percentages (`10` means 10%), also stored as `Decimal`.
//!
//! # Rounding
//!
//! Amounts are rounded to two decimal places with banker's rounding
//! (midpoint to even) exactly once, at the point where a figure becomes a
//! persisted amount. Intermediate products (`amount * rate / 100`) stay
//! unrounded. Re-deriving a stored figure therefore never compounds
//! rounding error.
//!
//! Checked arithmetic is used for every product so an absurd input surfaces
//! as a [`CommissionError::Validation`] instead of a panic.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::CommissionError;

/// Decimal places kept on every persisted amount.
pub const MONEY_DP: u32 = 2;

/// Round `v` to [`MONEY_DP`] places, midpoint to even, and normalise the
/// scale so `100` renders as `100.00`.
pub fn round_money(v: Decimal) -> Decimal {
    let mut r = v.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointNearestEven);
    r.rescale(MONEY_DP);
    r
}

/// Unrounded `amount * rate_pct / 100`.
pub fn percent_of(amount: Decimal, rate_pct: Decimal) -> Result<Decimal, CommissionError> {
    amount
        .checked_mul(rate_pct)
        .and_then(|p| p.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| {
            CommissionError::Validation(format!(
                "percentage overflow: {amount} x {rate_pct}%"
            ))
        })
}

/// Decimal places a persisted rate can carry (`numeric(7,4)`).
pub const RATE_DP: u32 = 4;

/// Rates are percentages in the closed range `[0, 100]`.
pub fn is_valid_rate(rate_pct: Decimal) -> bool {
    rate_pct >= Decimal::ZERO && rate_pct <= Decimal::ONE_HUNDRED
}

/// Reject a rate outside `[0, 100]` or finer than [`RATE_DP`] places,
/// naming the offending field. A finer rate would be truncated on storage
/// and no longer reproduce the amounts computed from it.
pub fn ensure_rate(field: &str, rate_pct: Decimal) -> Result<(), CommissionError> {
    if !is_valid_rate(rate_pct) {
        return Err(CommissionError::Validation(format!(
            "{field} must be within [0, 100], got {rate_pct}"
        )));
    }
    if rate_pct.normalize().scale() > RATE_DP {
        return Err(CommissionError::Validation(format!(
            "{field} must have at most {RATE_DP} decimal places, got {rate_pct}"
        )));
    }
    Ok(())
}

/// Exact sum of already-rounded amounts. The result is re-normalised to two
/// places; no rounding happens because the inputs are already at scale.
pub fn sum_money<I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    round_money(amounts.into_iter().fold(Decimal::ZERO, |acc, a| acc + a))
}
