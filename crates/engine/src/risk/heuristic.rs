//! Rule-based risk assessor.
//!
//! Looks for the three patterns the LLM prompt names, without calling out:
//! bursts of failed attempts (velocity), reuse of consumed vouchers (replay),
//! and runs of small deposits (smurfing). Usable standalone or as the
//! offline stand-in when no LLM is configured.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::risk::{AssessmentError, RiskAssessment, RiskAssessor, RiskLevel, DEFAULT_ANALYSIS};
use crate::types::{FailureReason, Transaction, TransactionStatus, TransactionType};

#[derive(Debug, Clone)]
pub struct HeuristicRiskAssessor {
    /// Sliding window for counting failed attempts.
    pub velocity_window: Duration,
    /// Failed attempts inside one window that count as a burst.
    pub velocity_threshold: usize,
    /// Deposits strictly below this (and above zero) count as small.
    pub small_deposit_limit: Decimal,
    /// Small deposits that count as structuring.
    pub smurfing_threshold: usize,
}

impl Default for HeuristicRiskAssessor {
    fn default() -> Self {
        Self {
            velocity_window: Duration::from_secs(5 * 60),
            velocity_threshold: 3,
            small_deposit_limit: Decimal::from(100),
            smurfing_threshold: 5,
        }
    }
}

impl HeuristicRiskAssessor {
    /// Largest number of brute-force style failures inside any one window.
    fn peak_failure_burst(&self, history: &[Transaction]) -> usize {
        let mut times: Vec<OffsetDateTime> = history
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Failed)
            .filter(|tx| {
                matches!(
                    tx.metadata.failure_reason,
                    Some(FailureReason::InvalidFormat)
                        | Some(FailureReason::NotFound)
                        | Some(FailureReason::IncorrectCredential)
                )
            })
            .filter_map(|tx| OffsetDateTime::parse(&tx.timestamp, &Rfc3339).ok())
            .collect();
        times.sort();

        let window = time::Duration::try_from(self.velocity_window).unwrap_or(time::Duration::MAX);
        let mut peak = 0;
        let mut start = 0;
        for end in 0..times.len() {
            while times[end] - times[start] > window {
                start += 1;
            }
            peak = peak.max(end - start + 1);
        }
        peak
    }

    fn replay_attempts(history: &[Transaction]) -> usize {
        history
            .iter()
            .filter(|tx| tx.metadata.failure_reason == Some(FailureReason::AlreadyConsumed))
            .count()
    }

    fn small_deposits(&self, history: &[Transaction]) -> usize {
        history
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Success)
            .filter(|tx| tx.kind == TransactionType::Deposit)
            .filter(|tx| tx.amount > Decimal::ZERO && tx.amount < self.small_deposit_limit)
            .count()
    }

    /// Score a history. Pure; shared by the async trait impl and callers
    /// that need a synchronous verdict.
    pub fn evaluate(&self, history: &[Transaction]) -> RiskAssessment {
        let mut score: u32 = 0;
        let mut findings: Vec<String> = Vec::new();

        let burst = self.peak_failure_burst(history);
        if burst >= self.velocity_threshold {
            let extra = (burst - self.velocity_threshold) as u32;
            score += 40 + (extra * 10).min(30);
            findings.push(format!(
                "Velocity: {} failed attempts within {} seconds suggests brute forcing.",
                burst,
                self.velocity_window.as_secs()
            ));
        }

        let replays = Self::replay_attempts(history);
        if replays > 0 {
            score += if replays >= 3 { 60 } else { 30 };
            findings.push(format!(
                "Replay: {} attempt(s) to redeem an already consumed voucher.",
                replays
            ));
        }

        let small = self.small_deposits(history);
        if small >= self.smurfing_threshold {
            score += 30;
            findings.push(format!(
                "Smurfing: {} deposits below {}.",
                small, self.small_deposit_limit
            ));
        }

        let risk_score = score.min(100) as u8;
        let risk_level = RiskLevel::from_score(risk_score);
        let recommended_action = match risk_level {
            RiskLevel::Low => "None",
            RiskLevel::Medium => "Flag for Review",
            RiskLevel::High => "Suspend redemptions pending review",
            RiskLevel::Critical => "Block User",
        };
        let analysis = if findings.is_empty() {
            DEFAULT_ANALYSIS.to_string()
        } else {
            findings.join(" ")
        };

        RiskAssessment {
            risk_score,
            risk_level,
            analysis,
            recommended_action: recommended_action.to_string(),
        }
    }
}

#[async_trait]
impl RiskAssessor for HeuristicRiskAssessor {
    async fn assess(&self, history: &[Transaction]) -> Result<RiskAssessment, AssessmentError> {
        Ok(self.evaluate(history))
    }
}
