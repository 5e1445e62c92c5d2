use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single-use voucher as held by the store.
///
/// Identity is the `code`. `consumed` transitions `false -> true` exactly
/// once, through `VoucherStore::mark_consumed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub code: String,
    /// Gross face value, before the network fee.
    pub amount: Decimal,
    pub provider: String,
    #[serde(default)]
    pub consumed: bool,
}

impl VoucherRecord {
    /// A fresh, not-yet-consumed voucher.
    pub fn new(code: impl Into<String>, amount: Decimal, provider: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            amount,
            provider: provider.into(),
            consumed: false,
        }
    }
}
