//! VoucherVault redemption core.
//!
//! Validates prepaid voucher codes against a [`VoucherStore`], applies the
//! flat redemption fee, authorizes the redeemer, and credits the net amount
//! to an append-only [`Ledger`]. Each voucher is credited at most once.
//! Risk assessment of a user's history is advisory and never blocks a
//! redemption.
//!
//! [`VoucherStore`]: vault_storage::VoucherStore

pub mod auth;
pub mod ledger;
pub mod numeric;
pub mod redemption;
pub mod risk;
pub mod types;
pub mod vault;
pub mod workflow;

pub use auth::{hash_secret, Credential};
pub use ledger::{Ledger, LedgerError};
pub use numeric::{FeeError, FeePolicy, DEFAULT_FEE};
pub use redemption::{PendingRedemption, RedemptionError, RedemptionService};
pub use risk::{
    assess_history_with_fallback, assess_with_fallback, AssessmentError, HeuristicRiskAssessor,
    RiskAssessment, RiskAssessor, RiskLevel,
};
pub use types::{
    FailureReason, Transaction, TransactionMetadata, TransactionStatus, TransactionType,
};
pub use vault::Vault;
pub use workflow::{
    AuthRetryPolicy, RedemptionWorkflow, SessionContext, WorkflowError, WorkflowState,
};
