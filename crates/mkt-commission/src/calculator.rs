//! Commission arithmetic for a single order item.
//!
//! ```text
//! commission_amount = round(order_amount * commission_rate / 100)
//! platform_fee      = round(order_amount * platform_fee_rate / 100)
//! net_amount        = commission_amount - platform_fee          (exact)
//! ```
//!
//! `order_amount` is the item amount rounded to cents; it must stay
//! positive after rounding, and both products are taken from it so the
//! persisted amount and rates reproduce the persisted figures. Each product
//! is rounded once (see [`crate::money`]). The net is the difference of two
//! 2-dp values and needs no rounding of its own.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CommissionError;
use crate::money::{ensure_rate, percent_of, round_money};
use crate::types::ResolvedRates;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub order_amount: Decimal,
    pub commission_rate: Decimal,
    pub platform_fee_rate: Decimal,
    pub commission_amount: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
}

pub fn calculate(
    order_amount: Decimal,
    rates: &ResolvedRates,
) -> Result<CommissionBreakdown, CommissionError> {
    let rounded = round_money(order_amount);
    if rounded <= Decimal::ZERO {
        return Err(CommissionError::Validation(format!(
            "order amount must be > 0 after rounding to cents, got {order_amount}"
        )));
    }
    ensure_rate("commission_rate", rates.commission_rate)?;
    ensure_rate("platform_fee_rate", rates.platform_fee_rate)?;

    let commission_amount = round_money(percent_of(rounded, rates.commission_rate)?);
    let platform_fee = round_money(percent_of(rounded, rates.platform_fee_rate)?);

    Ok(CommissionBreakdown {
        order_amount: rounded,
        commission_rate: rates.commission_rate,
        platform_fee_rate: rates.platform_fee_rate,
        commission_amount,
        platform_fee,
        net_amount: commission_amount - platform_fee,
    })
}
