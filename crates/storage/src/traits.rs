use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::VoucherRecord;

/// The storage trait for voucher redemption backends.
///
/// A `VoucherStore` holds known voucher codes, their gross value, the issuing
/// provider, and the consumed flag.
///
/// ## Anti-replay
///
/// `mark_consumed` is the single authoritative point that prevents a voucher
/// from being redeemed more than once. It is an atomic check-and-set: of any
/// number of concurrent callers for the same not-yet-consumed code, exactly
/// one observes `Ok(())` and every other observes
/// `Err(StorageError::AlreadyConsumed)`. Callers must invoke it immediately
/// before committing a ledger credit, not only during earlier validation.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared (behind an `Arc`) by many workflow instances and moved into
/// spawned commit tasks.
#[async_trait]
pub trait VoucherStore: Send + Sync + 'static {
    /// Read a voucher by code. Never mutates `consumed`.
    ///
    /// Returns `Err(StorageError::NotFound)` for an unknown code.
    async fn lookup(&self, code: &str) -> Result<VoucherRecord, StorageError>;

    /// Atomically flip `consumed` from `false` to `true`.
    ///
    /// Returns `Err(StorageError::AlreadyConsumed)` if the voucher was already
    /// consumed and `Err(StorageError::NotFound)` for an unknown code.
    async fn mark_consumed(&self, code: &str) -> Result<(), StorageError>;

    /// Add a voucher to the store (issuance / seeding).
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the code is taken.
    async fn insert(&self, record: VoucherRecord) -> Result<(), StorageError>;

    /// List all vouchers, ordered by code.
    async fn list(&self) -> Result<Vec<VoucherRecord>, StorageError>;
}
