//! Per-user wiring of the shared redemption service.
//!
//! The voucher store is global; ledgers are per user. `Vault` hands out
//! workflows bound to the right ledger for a session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vault_storage::VoucherStore;

use crate::ledger::Ledger;
use crate::numeric::FeePolicy;
use crate::redemption::RedemptionService;
use crate::risk::{assess_with_fallback, RiskAssessment, RiskAssessor};
use crate::workflow::{AuthRetryPolicy, RedemptionWorkflow, SessionContext};

pub struct Vault<S: VoucherStore> {
    service: Arc<RedemptionService<S>>,
    ledgers: Mutex<HashMap<String, Arc<Ledger>>>,
    policy: AuthRetryPolicy,
}

impl<S: VoucherStore> Vault<S> {
    pub fn new(store: Arc<S>, fees: FeePolicy, policy: AuthRetryPolicy) -> Self {
        Self {
            service: Arc::new(RedemptionService::new(store, fees)),
            ledgers: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn service(&self) -> &Arc<RedemptionService<S>> {
        &self.service
    }

    pub fn policy(&self) -> AuthRetryPolicy {
        self.policy
    }

    /// The ledger for `user_id`, created empty on first use.
    pub fn ledger_for(&self, user_id: &str) -> Arc<Ledger> {
        // The map only ever grows; a poisoned lock still holds a usable map.
        let mut ledgers = self.ledgers.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            ledgers
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Ledger::new())),
        )
    }

    /// Begin a redemption for the session's user.
    pub fn start(&self, session: SessionContext) -> RedemptionWorkflow<S> {
        let ledger = self.ledger_for(session.user_id());
        tracing::debug!(
            session = %session.session_id,
            user_id = %session.user_id(),
            "workflow started"
        );
        RedemptionWorkflow::new(Arc::clone(&self.service), ledger, session, self.policy)
    }

    /// Assess a user's history with the given assessor; never fails.
    pub async fn assess(
        &self,
        user_id: &str,
        assessor: &dyn RiskAssessor,
        timeout: Option<Duration>,
    ) -> RiskAssessment {
        let ledger = self.ledger_for(user_id);
        assess_with_fallback(assessor, &ledger, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use crate::risk::HeuristicRiskAssessor;
    use rust_decimal_macros::dec;
    use vault_storage::{InMemoryVoucherStore, VoucherRecord};

    fn vault() -> Vault<InMemoryVoucherStore> {
        let store = InMemoryVoucherStore::with_vouchers(vec![
            VoucherRecord::new("1234567890", dec!(500.00), "FNB eWallet"),
            VoucherRecord::new("0987654321", dec!(250.00), "Absa CashSend"),
        ]);
        Vault::new(
            Arc::new(store),
            FeePolicy::new(dec!(7.50)).unwrap(),
            AuthRetryPolicy::unbounded(),
        )
    }

    #[tokio::test]
    async fn ledgers_are_per_user() {
        let vault = vault();
        let alice = SessionContext::new(Credential::from_secret("alice", "s1", "1111"));
        let bob = SessionContext::new(Credential::from_secret("bob", "s2", "2222"));

        let mut wf = vault.start(alice);
        wf.submit_code("1234567890").await.unwrap();
        wf.confirm().unwrap();
        wf.submit_secret("1111").await.unwrap();

        let mut wf = vault.start(bob);
        wf.submit_code("0987654321").await.unwrap();
        wf.confirm().unwrap();
        wf.submit_secret("2222").await.unwrap();

        assert_eq!(vault.ledger_for("alice").balance().unwrap(), dec!(492.50));
        assert_eq!(vault.ledger_for("bob").balance().unwrap(), dec!(242.50));
        assert!(vault.ledger_for("carol").is_empty().unwrap());
    }

    #[tokio::test]
    async fn assess_reads_the_users_ledger() {
        let vault = vault();
        let session = SessionContext::new(Credential::from_secret("alice", "s1", "1111"));
        let mut wf = vault.start(session);
        wf.submit_code("0000000000").await.unwrap_err();

        let assessment = vault
            .assess("alice", &HeuristicRiskAssessor::default(), None)
            .await;
        assert_eq!(assessment.risk_score, 0);
        assert_eq!(vault.ledger_for("alice").len().unwrap(), 1);
    }
}
