/// All errors that can be returned by a VoucherStore implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No voucher with the given code is known to the store.
    #[error("voucher not found")]
    NotFound,

    /// The voucher has already been consumed. This is the anti-replay
    /// rejection returned by `mark_consumed` on every call after the first.
    #[error("voucher already consumed")]
    AlreadyConsumed,

    /// A voucher with this code already exists (seeding only).
    #[error("voucher already exists: {code}")]
    AlreadyExists { code: String },

    /// A backend-specific storage error (lock poisoning, DB connection, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
