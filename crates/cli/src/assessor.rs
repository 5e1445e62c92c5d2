//! Builds the configured risk assessor and runs it with fallback.

use vault_engine::risk::{assess_history_with_fallback, HeuristicRiskAssessor};
use vault_engine::{RiskAssessment, RiskAssessor, Transaction};

use crate::config::{AssessorKind, AssessorSettings};

pub(crate) fn build(settings: &AssessorSettings) -> Result<Box<dyn RiskAssessor>, String> {
    match settings.kind {
        AssessorKind::Heuristic => Ok(Box::new(HeuristicRiskAssessor::default())),
        AssessorKind::Anthropic => build_anthropic(settings),
    }
}

#[cfg(feature = "anthropic")]
fn build_anthropic(settings: &AssessorSettings) -> Result<Box<dyn RiskAssessor>, String> {
    use vault_engine::risk::{AnthropicClient, LlmRiskAssessor};

    let client = AnthropicClient::from_env().map_err(|e| e.to_string())?;
    let mut assessor = LlmRiskAssessor::new(Box::new(client), settings.model.clone());
    assessor.max_retries = settings.max_retries;
    Ok(Box::new(assessor))
}

#[cfg(not(feature = "anthropic"))]
fn build_anthropic(_settings: &AssessorSettings) -> Result<Box<dyn RiskAssessor>, String> {
    Err("vault was built without the `anthropic` feature".to_string())
}

/// Assess `history`; an assessor that cannot even be built degrades the
/// same way as one that fails at call time.
pub(crate) async fn assess(settings: &AssessorSettings, history: &[Transaction]) -> RiskAssessment {
    match build(settings) {
        Ok(assessor) => {
            assess_history_with_fallback(assessor.as_ref(), history, settings.timeout()).await
        }
        Err(reason) => {
            tracing::warn!(error = %reason, "risk assessor unavailable");
            RiskAssessment::degraded(&reason)
        }
    }
}
