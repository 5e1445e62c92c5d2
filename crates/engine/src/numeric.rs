//! Fee arithmetic using `rust_decimal`.
//!
//! All money is `Decimal` at a scale of two places. Fees and voucher
//! amounts carrying sub-cent digits are rejected rather than rounded. No
//! `f64` anywhere in the redemption path, so `500.00 - 7.50` is exactly
//! `492.50`.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

/// Decimal places carried by every ledger amount.
pub const MONEY_SCALE: u32 = 2;

/// The network fee charged on every voucher redemption in the demo data.
pub const DEFAULT_FEE: Decimal = Decimal::from_parts(750, 0, 0, false, 2);

/// Fee configuration errors. These are operator mistakes, never user-facing
/// voucher errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error("fee {fee} must not be negative")]
    NegativeFee { fee: Decimal },

    /// The net credit would be zero or negative.
    #[error("fee {fee} is not below voucher amount {amount}")]
    FeeExceedsAmount { fee: Decimal, amount: Decimal },

    #[error("arithmetic overflow computing net of {amount} - {fee}")]
    Overflow { fee: Decimal, amount: Decimal },

    /// Fee or amount with sub-cent digits, e.g. `10.005`.
    #[error("{value} has more than 2 decimal places")]
    ExcessPrecision { value: Decimal },
}

/// A fixed per-redemption fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    fee: Decimal,
}

impl FeePolicy {
    pub fn new(fee: Decimal) -> Result<Self, FeeError> {
        if fee < Decimal::ZERO {
            return Err(FeeError::NegativeFee { fee });
        }
        Ok(Self {
            fee: to_money(fee)?,
        })
    }

    pub fn fee(&self) -> Decimal {
        self.fee
    }

    /// Net credit for a voucher of gross value `amount`.
    ///
    /// Fails with `FeeExceedsAmount` when `fee >= amount`; the result is
    /// never clamped to zero. Amounts finer than a cent are refused with
    /// `ExcessPrecision`.
    pub fn net_amount(&self, amount: Decimal) -> Result<Decimal, FeeError> {
        let amount = to_money(amount)?;
        if self.fee >= amount {
            return Err(FeeError::FeeExceedsAmount {
                fee: self.fee,
                amount,
            });
        }
        let net = amount.checked_sub(self.fee).ok_or(FeeError::Overflow {
            fee: self.fee,
            amount,
        })?;
        to_money(net)
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { fee: DEFAULT_FEE }
    }
}

/// True when `value` carries significant digits past `MONEY_SCALE`.
/// Trailing zeros do not count: `7.500` is fine, `7.505` is not.
pub fn exceeds_money_scale(value: Decimal) -> bool {
    value.normalize().scale() > MONEY_SCALE
}

/// Pin `value` to `MONEY_SCALE` places without rounding.
fn to_money(value: Decimal) -> Result<Decimal, FeeError> {
    if exceeds_money_scale(value) {
        return Err(FeeError::ExcessPrecision { value });
    }
    let mut pinned = value;
    pinned.rescale(MONEY_SCALE);
    Ok(pinned)
}

/// Round to `MONEY_SCALE` places and pin the scale so that `492.5` renders
/// as `492.50`.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(MONEY_SCALE);
    rounded
}
