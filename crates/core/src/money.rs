//! Money arithmetic.
//!
//! Amounts are [`Decimal`]s rounded to 2 places, half-up, at the point they
//! are computed. Sums of already-rounded amounts need no further rounding.

use rust_decimal::{Decimal, RoundingStrategy};

const MONEY_SCALE: u32 = 2;

/// Round to 2 decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `quantity × unit_price`, rounded.
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round_money(quantity * unit_price)
}

/// `base × percentage / 100`, rounded.
pub fn percentage_of(base: Decimal, percentage: Decimal) -> Decimal {
    round_money(base * percentage / Decimal::ONE_HUNDRED)
}
