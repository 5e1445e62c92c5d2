//! Ledger transaction types shared by the workflow, the ledger, and the
//! risk assessors.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Direction of a ledger entry. The sign of `Transaction::amount` must agree
/// with it: deposits are non-negative, spends and fees non-positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Spend,
    Fee,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Spend => "SPEND",
            TransactionType::Fee => "FEE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Pending => "PENDING",
        };
        f.write_str(s)
    }
}

/// Why a redemption attempt was recorded as FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    InvalidFormat,
    NotFound,
    AlreadyConsumed,
    IncorrectCredential,
    FatalConfiguration,
}

impl FailureReason {
    /// The actionable message shown to the person redeeming.
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::InvalidFormat => "Invalid format. Code must be 10-12 digits.",
            FailureReason::NotFound => "Invalid voucher code.",
            FailureReason::AlreadyConsumed => "Replay detected: voucher already redeemed.",
            FailureReason::IncorrectCredential => "Incorrect credential.",
            FailureReason::FatalConfiguration => {
                "Voucher cannot be redeemed: fee configuration is invalid."
            }
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Optional per-transaction annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Base64 SHA-256 fingerprint of the voucher code. Raw codes are never
    /// written to the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_code_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// Signed amount: positive = credit.
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub description: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub metadata: TransactionMetadata,
}

impl Transaction {
    /// Build a transaction with a fresh id, stamped now.
    pub fn new(
        kind: TransactionType,
        amount: Decimal,
        description: impl Into<String>,
        status: TransactionStatus,
        metadata: TransactionMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now_rfc3339(),
            amount,
            kind,
            description: description.into(),
            status,
            metadata,
        }
    }

    /// Whether this entry counts towards the ledger balance.
    pub fn is_settled(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transaction_serializes_wire_names() {
        let tx = Transaction::new(
            TransactionType::Deposit,
            dec!(492.50),
            "Redeemed FNB eWallet",
            TransactionStatus::Success,
            TransactionMetadata {
                fee: Some(dec!(7.50)),
                original_amount: Some(dec!(500.00)),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "DEPOSIT");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["amount"], "492.50");
        assert_eq!(json["metadata"]["fee"], "7.50");
        assert!(json["metadata"].get("failure_reason").is_none());
    }

    #[test]
    fn failure_reason_parses_from_wire() {
        let meta: TransactionMetadata =
            serde_json::from_str(r#"{"failure_reason": "ALREADY_CONSUMED"}"#).unwrap();
        assert_eq!(meta.failure_reason, Some(FailureReason::AlreadyConsumed));
        assert_eq!(meta.fee, None);
    }

    #[test]
    fn timestamps_parse_as_rfc3339() {
        let ts = now_rfc3339();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }
}
