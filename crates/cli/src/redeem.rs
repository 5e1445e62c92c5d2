//! `vault redeem`: drive one redemption workflow from the command line.
//!
//! The pending redemption is confirmed automatically. Each `--pin` is one
//! authorization attempt, consumed in order until the workflow reaches a
//! terminal state.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use vault_engine::{
    PendingRedemption, RiskAssessment, SessionContext, Transaction, TransactionStatus, Vault,
    WorkflowState,
};
use vault_storage::InMemoryVoucherStore;

use crate::config::VaultConfig;

#[derive(Debug, Serialize)]
pub(crate) struct RedeemReport {
    pub outcome: WorkflowState,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingRedemption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    pub balance: Decimal,
    pub history: Vec<Transaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<RiskAssessment>,
}

pub(crate) async fn run(
    config: &VaultConfig,
    code: &str,
    pins: &[String],
    assess: bool,
) -> Result<RedeemReport, String> {
    let credential = config.credential().map_err(|e| e.to_string())?.clone();
    let fees = config.fee_policy().map_err(|e| e.to_string())?;
    let store = Arc::new(InMemoryVoucherStore::with_vouchers(config.vouchers.clone()));
    let vault = Vault::new(store, fees, config.retry_policy());

    let session = SessionContext::new(credential);
    let user_id = session.user_id().to_string();
    let mut workflow = vault.start(session);

    let mut messages = Vec::new();
    let mut pending = None;
    let mut transaction = None;

    match workflow.submit_code(code).await {
        Ok(p) => {
            pending = Some(p);
            workflow.confirm().map_err(|e| e.to_string())?;
            for pin in pins {
                match workflow.submit_secret(pin).await {
                    Ok(tx) => {
                        messages.push(format!("Credited {}.", tx.amount));
                        transaction = Some(tx);
                        break;
                    }
                    Err(e) => {
                        messages.push(e.user_message());
                        if workflow.state().is_terminal() {
                            break;
                        }
                    }
                }
            }
        }
        Err(e) => messages.push(e.user_message()),
    }

    let outcome = workflow.state();
    if !outcome.is_terminal() {
        messages.push("Authorization not completed; redemption abandoned.".to_string());
        workflow.abandon();
    }

    let (balance, history) = vault
        .ledger_for(&user_id)
        .view()
        .map_err(|e| e.to_string())?;
    let assessment = if assess {
        Some(crate::assessor::assess(&config.assessor, &history).await)
    } else {
        None
    };

    Ok(RedeemReport {
        outcome,
        messages,
        pending,
        transaction,
        balance,
        history,
        assessment,
    })
}

pub(crate) fn print_text(report: &RedeemReport) {
    if let Some(pending) = &report.pending {
        println!("Voucher: {}", pending.provider);
        println!("  Amount: {}", pending.amount);
        println!("  Fee:    {}", pending.fee);
        println!("  Net:    {}", pending.net);
    }
    for message in &report.messages {
        println!("{}", message);
    }
    println!("Outcome: {}", report.outcome);
    println!("Balance: {}", report.balance);
    println!("History:");
    for tx in &report.history {
        println!("  {}", history_line(tx));
    }
    if let Some(assessment) = &report.assessment {
        crate::print_assessment_text(assessment);
    }
}

pub(crate) fn history_line(tx: &Transaction) -> String {
    let mut line = format!(
        "{}  {:<7} {:<7} {:>10}  {}",
        tx.timestamp,
        tx.kind.to_string(),
        tx.status.to_string(),
        tx.amount.to_string(),
        tx.description
    );
    if tx.status == TransactionStatus::Failed {
        if let Some(reason) = tx.metadata.failure_reason {
            line.push_str(&format!(" ({})", reason.message()));
        }
    }
    line
}
