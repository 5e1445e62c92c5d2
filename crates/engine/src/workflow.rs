//! Redemption workflow state machine.
//!
//! One workflow instance is driven by one session, sequentially:
//!
//! ```text
//! AwaitingCode -> Validating -> AwaitingConfirmation -> AwaitingAuth -> Finalizing -> Complete
//!                     |                                     ^   |             |
//!                     +--> Failed          (retry allowed)  +---+             +--> Failed
//! ```
//!
//! Only the commit step (`finalize` then ledger `append`, in that order)
//! mutates shared state. Everything before it is side-effect free apart from
//! FAILED audit entries, so dropping or abandoning a workflow before the
//! commit leaves the voucher store and the balance untouched. Once started,
//! the commit runs on its own task and completes even if the caller stops
//! polling.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vault_storage::VoucherStore;

use crate::auth::Credential;
use crate::ledger::{Ledger, LedgerError};
use crate::numeric::round_money;
use crate::redemption::{fingerprint_code, PendingRedemption, RedemptionError, RedemptionService};
use crate::types::{
    FailureReason, Transaction, TransactionMetadata, TransactionStatus, TransactionType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    AwaitingCode,
    Validating,
    AwaitingConfirmation,
    AwaitingAuth,
    Finalizing,
    Complete,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Complete | WorkflowState::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::AwaitingCode => "AWAITING_CODE",
            WorkflowState::Validating => "VALIDATING",
            WorkflowState::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            WorkflowState::AwaitingAuth => "AWAITING_AUTH",
            WorkflowState::Finalizing => "FINALIZING",
            WorkflowState::Complete => "COMPLETE",
            WorkflowState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("cannot {action} in state {state}")]
    InvalidState {
        state: WorkflowState,
        action: &'static str,
    },

    #[error(transparent)]
    Redemption(#[from] RedemptionError),

    /// `attempts_remaining` is `None` when retries are unbounded; `Some(0)`
    /// means the workflow has failed.
    #[error("incorrect credential")]
    IncorrectCredential { attempts_remaining: Option<u32> },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("commit task failed: {0}")]
    Commit(String),
}

impl WorkflowError {
    /// The message to show the person redeeming.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Redemption(e) => match e.failure_reason() {
                Some(reason) => reason.message().to_string(),
                None => "Connection error. Please try again.".to_string(),
            },
            WorkflowError::IncorrectCredential {
                attempts_remaining: Some(0),
            } => "Incorrect PIN. No attempts remaining.".to_string(),
            WorkflowError::IncorrectCredential {
                attempts_remaining: Some(n),
            } => format!("Incorrect PIN. {} attempt(s) remaining.", n),
            WorkflowError::IncorrectCredential {
                attempts_remaining: None,
            } => "Incorrect PIN.".to_string(),
            other => other.to_string(),
        }
    }
}

/// How many wrong secrets a workflow tolerates before failing.
///
/// `max_attempts: None` allows unlimited retries. `Some(n)` fails the
/// workflow on the n-th incorrect secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRetryPolicy {
    pub max_attempts: Option<u32>,
}

impl AuthRetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn limited(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    fn remaining_after(&self, failures: u32) -> Option<u32> {
        self.max_attempts.map(|max| max.saturating_sub(failures))
    }
}

/// The actor driving a workflow: who is redeeming, and what they must prove.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub credential: Credential,
}

impl SessionContext {
    pub fn new(credential: Credential) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            credential,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.credential.user_id
    }
}

/// One redemption attempt, from code entry to a terminal state.
pub struct RedemptionWorkflow<S: VoucherStore> {
    service: Arc<RedemptionService<S>>,
    ledger: Arc<Ledger>,
    session: SessionContext,
    policy: AuthRetryPolicy,
    state: WorkflowState,
    code: Option<String>,
    pending: Option<PendingRedemption>,
    failed_auth_attempts: u32,
}

impl<S: VoucherStore> RedemptionWorkflow<S> {
    pub fn new(
        service: Arc<RedemptionService<S>>,
        ledger: Arc<Ledger>,
        session: SessionContext,
        policy: AuthRetryPolicy,
    ) -> Self {
        Self {
            service,
            ledger,
            session,
            policy,
            state: WorkflowState::AwaitingCode,
            code: None,
            pending: None,
            failed_auth_attempts: 0,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingRedemption> {
        self.pending.as_ref()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn failed_auth_attempts(&self) -> u32 {
        self.failed_auth_attempts
    }

    fn expect_state(
        &self,
        expected: WorkflowState,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkflowError::InvalidState {
                state: self.state,
                action,
            })
        }
    }

    fn transition(&mut self, to: WorkflowState) {
        tracing::debug!(
            session = %self.session.session_id,
            from = %self.state,
            to = %to,
            "workflow transition"
        );
        self.state = to;
    }

    /// Submit a voucher code for validation.
    ///
    /// On success the workflow awaits confirmation of the returned pending
    /// redemption. On any validation error a FAILED audit entry is recorded
    /// and the workflow is terminal.
    pub async fn submit_code(&mut self, code: &str) -> Result<PendingRedemption, WorkflowError> {
        self.expect_state(WorkflowState::AwaitingCode, "submit a code")?;
        self.transition(WorkflowState::Validating);

        match self.service.validate(code).await {
            Ok(pending) => {
                tracing::info!(
                    session = %self.session.session_id,
                    voucher = %fingerprint_code(code),
                    provider = %pending.provider,
                    net = %pending.net,
                    "voucher validated"
                );
                self.code = Some(code.to_string());
                self.pending = Some(pending.clone());
                self.transition(WorkflowState::AwaitingConfirmation);
                Ok(pending)
            }
            Err(e) => {
                tracing::warn!(
                    session = %self.session.session_id,
                    voucher = %fingerprint_code(code),
                    error = %e,
                    "voucher validation failed"
                );
                let metadata = TransactionMetadata {
                    voucher_code_hash: Some(fingerprint_code(code)),
                    failure_reason: e.failure_reason(),
                    ..Default::default()
                };
                record_failure(&self.ledger, "Voucher redemption failed", metadata);
                self.transition(WorkflowState::Failed);
                Err(e.into())
            }
        }
    }

    /// Accept the fee and net amount shown for the pending redemption.
    pub fn confirm(&mut self) -> Result<(), WorkflowError> {
        self.expect_state(WorkflowState::AwaitingConfirmation, "confirm")?;
        self.transition(WorkflowState::AwaitingAuth);
        Ok(())
    }

    /// Authorize the redemption with the session's secret and, if it
    /// verifies, commit it.
    ///
    /// An incorrect secret records a FAILED audit entry and returns the
    /// workflow to `AwaitingAuth` until the retry policy is exhausted.
    pub async fn submit_secret(&mut self, secret: &str) -> Result<Transaction, WorkflowError> {
        self.expect_state(WorkflowState::AwaitingAuth, "submit a secret")?;
        self.transition(WorkflowState::Finalizing);

        let (code, pending) = match (self.code.clone(), self.pending.clone()) {
            (Some(code), Some(pending)) => (code, pending),
            _ => {
                self.transition(WorkflowState::Failed);
                return Err(WorkflowError::InvalidState {
                    state: WorkflowState::Finalizing,
                    action: "authorize without a pending redemption",
                });
            }
        };

        if !self.session.credential.verify(secret) {
            self.failed_auth_attempts += 1;
            let attempts_remaining = self.policy.remaining_after(self.failed_auth_attempts);
            tracing::warn!(
                session = %self.session.session_id,
                user_id = %self.session.user_id(),
                failures = self.failed_auth_attempts,
                "incorrect credential"
            );
            record_failure(
                &self.ledger,
                "Redemption authorization failed",
                attempt_metadata(&code, &pending, FailureReason::IncorrectCredential),
            );
            if attempts_remaining == Some(0) {
                self.code = None;
                self.pending = None;
                self.transition(WorkflowState::Failed);
            } else {
                self.transition(WorkflowState::AwaitingAuth);
            }
            return Err(WorkflowError::IncorrectCredential { attempts_remaining });
        }

        let service = Arc::clone(&self.service);
        let ledger = Arc::clone(&self.ledger);
        let commit = tokio::spawn(commit(service, ledger, code, pending));
        let result = match commit.await {
            Ok(result) => result,
            Err(join) => Err(WorkflowError::Commit(join.to_string())),
        };

        self.code = None;
        self.pending = None;
        match result {
            Ok(tx) => {
                self.transition(WorkflowState::Complete);
                Ok(tx)
            }
            Err(e) => {
                self.transition(WorkflowState::Failed);
                Err(e)
            }
        }
    }

    /// Walk away from the workflow. Permitted in any non-terminal state;
    /// nothing is committed.
    pub fn abandon(self) {
        tracing::info!(
            session = %self.session.session_id,
            state = %self.state,
            "workflow abandoned"
        );
    }
}

/// Finalize then credit. Runs to completion on its own task.
async fn commit<S: VoucherStore>(
    service: Arc<RedemptionService<S>>,
    ledger: Arc<Ledger>,
    code: String,
    pending: PendingRedemption,
) -> Result<Transaction, WorkflowError> {
    if let Err(e) = service.finalize(&code).await {
        tracing::warn!(
            voucher = %fingerprint_code(&code),
            error = %e,
            "finalize rejected; nothing credited"
        );
        let reason = e.failure_reason().unwrap_or(FailureReason::AlreadyConsumed);
        record_failure(
            &ledger,
            "Voucher redemption failed",
            attempt_metadata(&code, &pending, reason),
        );
        return Err(e.into());
    }

    let tx = Transaction::new(
        TransactionType::Deposit,
        pending.net,
        format!("Redeemed {}", pending.provider),
        TransactionStatus::Success,
        TransactionMetadata {
            voucher_code_hash: Some(fingerprint_code(&code)),
            provider: Some(pending.provider.clone()),
            fee: Some(pending.fee),
            original_amount: Some(pending.amount),
            failure_reason: None,
        },
    );
    if let Err(e) = ledger.append(tx.clone()) {
        // The voucher is consumed but uncredited; this needs manual repair.
        tracing::error!(
            voucher = %fingerprint_code(&code),
            net = %pending.net,
            error = %e,
            "voucher consumed but ledger credit failed"
        );
        return Err(e.into());
    }
    Ok(tx)
}

fn attempt_metadata(
    code: &str,
    pending: &PendingRedemption,
    reason: FailureReason,
) -> TransactionMetadata {
    TransactionMetadata {
        voucher_code_hash: Some(fingerprint_code(code)),
        provider: Some(pending.provider.clone()),
        fee: Some(pending.fee),
        original_amount: Some(pending.amount),
        failure_reason: Some(reason),
    }
}

/// Append a zero-amount FAILED audit entry.
fn record_failure(ledger: &Ledger, description: &str, metadata: TransactionMetadata) {
    let tx = Transaction::new(
        TransactionType::Deposit,
        round_money(Decimal::ZERO),
        description,
        TransactionStatus::Failed,
        metadata,
    );
    if let Err(e) = ledger.append(tx) {
        tracing::error!(error = %e, "failed to record audit entry");
    }
}
