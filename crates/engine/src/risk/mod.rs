//! Risk assessment contracts.
//!
//! A `RiskAssessor` classifies a transaction history into a risk level and a
//! recommended action. The core consumes assessors but never depends on
//! them: `assess_with_fallback` snapshots the ledger first, calls the
//! assessor with no lock held, and turns every failure (unreachable,
//! unparsable, timed out) into a degraded LOW assessment.

mod heuristic;
mod llm;

pub use heuristic::HeuristicRiskAssessor;
pub use llm::{LlmClient, LlmError, LlmRiskAssessor, Message, Role, API_KEY_VAR};

#[cfg(feature = "anthropic")]
pub use llm::AnthropicClient;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::types::{FailureReason, Transaction, TransactionStatus, TransactionType};

pub const DEFAULT_ANALYSIS: &str = "No anomalies detected.";
pub const DEFAULT_RECOMMENDED_ACTION: &str = "None";
pub const DEGRADED_RECOMMENDED_ACTION: &str = "Manual Review";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Case-insensitive parse of `LOW|MEDIUM|HIGH|CRITICAL`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(RiskLevel::Low),
            "MEDIUM" => Some(RiskLevel::Medium),
            "HIGH" => Some(RiskLevel::High),
            "CRITICAL" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// The level a 0-100 score falls into.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskLevel::Low,
            30..=59 => RiskLevel::Medium,
            60..=84 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// An advisory verdict over a transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// 0 to 100 inclusive.
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub analysis: String,
    pub recommended_action: String,
}

impl RiskAssessment {
    /// The assessment returned when the assessor could not be used.
    pub fn degraded(reason: &str) -> Self {
        Self {
            risk_score: 0,
            risk_level: RiskLevel::Low,
            analysis: format!(
                "Risk assessor unreachable ({}). Defaulting to rule-based checks.",
                reason
            ),
            recommended_action: DEGRADED_RECOMMENDED_ACTION.to_string(),
        }
    }

    /// Read an assessor's JSON response, defaulting every missing or
    /// malformed field instead of failing.
    pub fn from_response(value: &serde_json::Value) -> Self {
        let risk_score = value
            .get("riskScore")
            .and_then(|v| v.as_f64())
            .filter(|f| f.is_finite())
            .map(|f| f.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0);
        let risk_level = value
            .get("riskLevel")
            .and_then(|v| v.as_str())
            .and_then(RiskLevel::parse)
            .unwrap_or_default();
        let analysis = non_empty_str(value, "analysis").unwrap_or(DEFAULT_ANALYSIS);
        let recommended_action =
            non_empty_str(value, "recommendedAction").unwrap_or(DEFAULT_RECOMMENDED_ACTION);

        Self {
            risk_score,
            risk_level,
            analysis: analysis.to_string(),
            recommended_action: recommended_action.to_string(),
        }
    }
}

fn non_empty_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// One row of the log handed to an assessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLogEntry {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub reason: Option<FailureReason>,
}

impl From<&Transaction> for RiskLogEntry {
    fn from(tx: &Transaction) -> Self {
        Self {
            time: tx.timestamp.clone(),
            kind: tx.kind,
            amount: tx.amount,
            status: tx.status,
            reason: tx.metadata.failure_reason,
        }
    }
}

/// The assessor request: history projected to log rows, in order.
pub fn risk_log(history: &[Transaction]) -> Vec<RiskLogEntry> {
    history.iter().map(RiskLogEntry::from).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssessmentError {
    #[error("assessor unavailable: {0}")]
    Unavailable(String),

    #[error("assessor response unusable: {0}")]
    Parse(String),

    #[error("assessor timed out after {0:?}")]
    Timeout(Duration),
}

/// An external, advisory classifier of transaction histories.
#[async_trait]
pub trait RiskAssessor: Send + Sync {
    async fn assess(&self, history: &[Transaction]) -> Result<RiskAssessment, AssessmentError>;
}

/// Assess a history; never fails.
pub async fn assess_history_with_fallback(
    assessor: &dyn RiskAssessor,
    history: &[Transaction],
    timeout: Option<Duration>,
) -> RiskAssessment {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, assessor.assess(history)).await {
            Ok(result) => result,
            Err(_) => Err(AssessmentError::Timeout(limit)),
        },
        None => assessor.assess(history).await,
    };

    match result {
        Ok(assessment) => assessment,
        Err(e) => {
            tracing::warn!(error = %e, "risk assessment degraded");
            RiskAssessment::degraded(&e.to_string())
        }
    }
}

/// Assess the ledger's current history; never fails and never holds the
/// ledger lock while the assessor runs.
pub async fn assess_with_fallback(
    assessor: &dyn RiskAssessor,
    ledger: &Ledger,
    timeout: Option<Duration>,
) -> RiskAssessment {
    let history = match ledger.snapshot() {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(error = %e, "ledger snapshot failed; risk assessment degraded");
            return RiskAssessment::degraded(&e.to_string());
        }
    };
    assess_history_with_fallback(assessor, &history, timeout).await
}

/// Strip markdown code fences from a response string.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    if let Some(stripped) = trimmed.strip_prefix("```json") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionMetadata;
    use rust_decimal_macros::dec;
    use serde_json::json;

    struct Unreachable;

    #[async_trait]
    impl RiskAssessor for Unreachable {
        async fn assess(&self, _: &[Transaction]) -> Result<RiskAssessment, AssessmentError> {
            Err(AssessmentError::Unavailable("connection refused".to_string()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl RiskAssessor for Stalled {
        async fn assess(&self, _: &[Transaction]) -> Result<RiskAssessment, AssessmentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RiskAssessment::from_response(&json!({"riskScore": 99})))
        }
    }

    #[test]
    fn response_fields_default_when_missing() {
        let a = RiskAssessment::from_response(&json!({}));
        assert_eq!(a.risk_score, 0);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.analysis, "No anomalies detected.");
        assert_eq!(a.recommended_action, "None");
    }

    #[test]
    fn response_fields_default_when_malformed() {
        let a = RiskAssessment::from_response(&json!({
            "riskScore": "very high",
            "riskLevel": "APOCALYPTIC",
            "analysis": 42,
            "recommendedAction": ""
        }));
        assert_eq!(a.risk_score, 0);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.analysis, DEFAULT_ANALYSIS);
        assert_eq!(a.recommended_action, DEFAULT_RECOMMENDED_ACTION);
    }

    #[test]
    fn response_well_formed() {
        let a = RiskAssessment::from_response(&json!({
            "riskScore": 87.4,
            "riskLevel": "critical",
            "analysis": "Repeated replay attempts.",
            "recommendedAction": "Block User"
        }));
        assert_eq!(a.risk_score, 87);
        assert_eq!(a.risk_level, RiskLevel::Critical);
        assert_eq!(a.analysis, "Repeated replay attempts.");
        assert_eq!(a.recommended_action, "Block User");
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(
            RiskAssessment::from_response(&json!({"riskScore": 250})).risk_score,
            100
        );
        assert_eq!(
            RiskAssessment::from_response(&json!({"riskScore": -3})).risk_score,
            0
        );
    }

    #[test]
    fn assessment_uses_camel_case_on_the_wire() {
        let json = serde_json::to_value(RiskAssessment::degraded("x")).unwrap();
        assert_eq!(json["riskScore"], 0);
        assert_eq!(json["riskLevel"], "LOW");
        assert_eq!(json["recommendedAction"], "Manual Review");
        assert!(json["analysis"].as_str().unwrap().contains("unreachable"));
    }

    #[test]
    fn risk_log_projects_history() {
        let history = vec![Transaction::new(
            TransactionType::Deposit,
            Decimal::ZERO,
            "Voucher redemption failed",
            TransactionStatus::Failed,
            TransactionMetadata {
                failure_reason: Some(FailureReason::AlreadyConsumed),
                ..Default::default()
            },
        )];
        let log = risk_log(&history);
        assert_eq!(log.len(), 1);
        let row = serde_json::to_value(&log[0]).unwrap();
        assert_eq!(row["type"], "DEPOSIT");
        assert_eq!(row["status"], "FAILED");
        assert_eq!(row["reason"], "ALREADY_CONSUMED");
        assert_eq!(row["time"], history[0].timestamp.as_str());
    }

    #[test]
    fn level_from_score_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[tokio::test]
    async fn unreachable_assessor_degrades() {
        let ledger = Ledger::new();
        ledger
            .append(Transaction::new(
                TransactionType::Deposit,
                dec!(492.50),
                "Redeemed FNB eWallet",
                TransactionStatus::Success,
                TransactionMetadata::default(),
            ))
            .unwrap();
        let a = assess_with_fallback(&Unreachable, &ledger, None).await;
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.risk_score, 0);
        assert_eq!(a.recommended_action, DEGRADED_RECOMMENDED_ACTION);
        assert!(a.analysis.contains("connection refused"));
        // The ledger is untouched and still usable.
        assert_eq!(ledger.balance().unwrap(), dec!(492.50));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_assessor_times_out() {
        let ledger = Ledger::new();
        let a = assess_with_fallback(&Stalled, &ledger, Some(Duration::from_secs(5))).await;
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert!(a.analysis.contains("timed out"));
    }

    #[test]
    fn strip_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }
}
