//! Voucher Redemption Service: format check, store lookup, fee/net
//! computation, and the committing `finalize` step.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vault_storage::{StorageError, VoucherStore};

use crate::numeric::{FeeError, FeePolicy};
use crate::types::FailureReason;

/// Shortest accepted voucher code.
pub const MIN_CODE_LEN: usize = 10;
/// Longest accepted voucher code.
pub const MAX_CODE_LEN: usize = 12;

/// Errors produced while validating or finalizing a voucher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedemptionError {
    #[error("invalid format: code must be 10-12 digits")]
    InvalidFormat,

    #[error("voucher not found")]
    NotFound,

    /// Anti-replay rejection.
    #[error("replay detected: voucher already redeemed")]
    AlreadyConsumed,

    /// The fee is not below the voucher amount. Not a user error.
    #[error("fatal configuration error: {0}")]
    FatalConfiguration(#[from] FeeError),

    #[error("voucher store unavailable: {0}")]
    Storage(String),
}

impl RedemptionError {
    /// The audit reason recorded on the FAILED ledger entry, if this error
    /// belongs to the user-facing taxonomy.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            RedemptionError::InvalidFormat => Some(FailureReason::InvalidFormat),
            RedemptionError::NotFound => Some(FailureReason::NotFound),
            RedemptionError::AlreadyConsumed => Some(FailureReason::AlreadyConsumed),
            RedemptionError::FatalConfiguration(_) => Some(FailureReason::FatalConfiguration),
            RedemptionError::Storage(_) => None,
        }
    }
}

impl From<StorageError> for RedemptionError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => RedemptionError::NotFound,
            StorageError::AlreadyConsumed => RedemptionError::AlreadyConsumed,
            other => RedemptionError::Storage(other.to_string()),
        }
    }
}

/// The result of a successful validation, held by exactly one workflow
/// instance until it finalizes or is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRedemption {
    /// Gross voucher value.
    pub amount: Decimal,
    pub fee: Decimal,
    /// `amount - fee`, the amount that will be credited.
    pub net: Decimal,
    pub provider: String,
}

/// Validates codes against a `VoucherStore` and finalizes redemptions.
pub struct RedemptionService<S: VoucherStore> {
    store: Arc<S>,
    fees: FeePolicy,
}

impl<S: VoucherStore> RedemptionService<S> {
    pub fn new(store: Arc<S>, fees: FeePolicy) -> Self {
        Self { store, fees }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn fees(&self) -> FeePolicy {
        self.fees
    }

    /// Check a code and compute what redeeming it would credit.
    ///
    /// Side-effect free: the store is only read, and only after the format
    /// check passes.
    pub async fn validate(&self, code: &str) -> Result<PendingRedemption, RedemptionError> {
        if !is_well_formed_code(code) {
            return Err(RedemptionError::InvalidFormat);
        }

        let voucher = self.store.lookup(code).await?;
        if voucher.consumed {
            return Err(RedemptionError::AlreadyConsumed);
        }

        let net = self.fees.net_amount(voucher.amount).map_err(|e| {
            tracing::error!(
                provider = %voucher.provider,
                error = %e,
                "voucher amount does not cover the redemption fee"
            );
            RedemptionError::FatalConfiguration(e)
        })?;

        Ok(PendingRedemption {
            amount: voucher.amount,
            fee: self.fees.fee(),
            net,
            provider: voucher.provider,
        })
    }

    /// Consume the voucher. Succeeds at most once per code, across all
    /// callers.
    pub async fn finalize(&self, code: &str) -> Result<(), RedemptionError> {
        self.store.mark_consumed(code).await?;
        Ok(())
    }
}

/// `^\d{10,12}$`, ASCII digits only.
pub fn is_well_formed_code(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_digit())
}

/// Base64 SHA-256 of a voucher code, used wherever a code would otherwise be
/// logged or recorded.
pub fn fingerprint_code(code: &str) -> String {
    BASE64.encode(Sha256::digest(code.as_bytes()))
}
