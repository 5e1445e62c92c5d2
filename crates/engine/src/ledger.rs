//! Append-only transaction log with a derived running balance.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::numeric::round_money;
use crate::types::{Transaction, TransactionType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The amount's sign contradicts the transaction type.
    #[error("malformed transaction {id}: {kind} amount {amount} has the wrong sign")]
    WrongSign {
        id: Uuid,
        kind: TransactionType,
        amount: Decimal,
    },

    #[error("duplicate transaction id {0}")]
    DuplicateId(Uuid),

    #[error("balance overflow applying transaction {0}")]
    Overflow(Uuid),

    #[error("ledger lock poisoned: {0}")]
    Poisoned(String),
}

#[derive(Debug)]
struct LedgerInner {
    balance: Decimal,
    history: Vec<Transaction>,
    ids: HashSet<Uuid>,
}

impl Default for LedgerInner {
    fn default() -> Self {
        Self {
            // Scale 2 from the start so an empty ledger renders "0.00".
            balance: round_money(Decimal::ZERO),
            history: Vec::new(),
            ids: HashSet::new(),
        }
    }
}

/// The ledger. History push and balance update happen under one lock, so
/// every reader sees `balance == sum(amount of SUCCESS entries in history)`.
#[derive(Debug, Default)]
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, LedgerInner>, LedgerError> {
        self.inner
            .lock()
            .map_err(|e| LedgerError::Poisoned(e.to_string()))
    }

    /// Append `tx` and apply its signed effect on the balance.
    ///
    /// Only SUCCESS entries move the balance; FAILED and PENDING entries are
    /// audit records. Well-formed transactions always append.
    pub fn append(&self, tx: Transaction) -> Result<(), LedgerError> {
        let wrong_sign = match tx.kind {
            TransactionType::Deposit => tx.amount < Decimal::ZERO,
            TransactionType::Spend | TransactionType::Fee => tx.amount > Decimal::ZERO,
        };
        if wrong_sign {
            return Err(LedgerError::WrongSign {
                id: tx.id,
                kind: tx.kind,
                amount: tx.amount,
            });
        }

        let mut inner = self.guard()?;
        if inner.ids.contains(&tx.id) {
            return Err(LedgerError::DuplicateId(tx.id));
        }
        let balance = if tx.is_settled() {
            inner
                .balance
                .checked_add(tx.amount)
                .ok_or(LedgerError::Overflow(tx.id))?
        } else {
            inner.balance
        };

        tracing::info!(
            id = %tx.id,
            kind = %tx.kind,
            status = %tx.status,
            amount = %tx.amount,
            balance = %balance,
            "ledger append"
        );
        inner.balance = balance;
        inner.ids.insert(tx.id);
        inner.history.push(tx);
        Ok(())
    }

    pub fn balance(&self) -> Result<Decimal, LedgerError> {
        Ok(self.guard()?.balance)
    }

    /// A copy of the history in append order.
    pub fn snapshot(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.guard()?.history.clone())
    }

    /// Balance and history observed under the same lock.
    pub fn view(&self) -> Result<(Decimal, Vec<Transaction>), LedgerError> {
        let inner = self.guard()?;
        Ok((inner.balance, inner.history.clone()))
    }

    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.guard()?.history.len())
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}

/// Recompute a balance from scratch.
pub fn settled_sum(history: &[Transaction]) -> Decimal {
    history
        .iter()
        .filter(|tx| tx.is_settled())
        .map(|tx| tx.amount)
        .sum()
}
