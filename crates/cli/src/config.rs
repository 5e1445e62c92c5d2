//! Configuration format for the `vault` binary.
//!
//! # Example
//!
//! ```toml
//! [redemption]
//! fee = "7.50"
//! max_auth_attempts = 3
//!
//! [credential]
//! user_id = "usr_839201"
//! salt = "vv-demo-salt-839201"
//! secret_hash = "<output of `vault hash-secret`>"
//!
//! [[vouchers]]
//! code = "1234567890"
//! amount = "500.00"
//! provider = "FNB eWallet"
//!
//! [assessor]
//! kind = "heuristic"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vault_engine::redemption::{fingerprint_code, is_well_formed_code};
use vault_engine::{AuthRetryPolicy, Credential, FeeError, FeePolicy, DEFAULT_FEE};
use vault_storage::VoucherRecord;

/// The bundled example, also used when no `--config` is given.
pub static EXAMPLE_CONFIG: &str = include_str!("../../../config/vault.example.toml");

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub redemption: RedemptionSettings,
    pub credential: Option<Credential>,
    /// Seed data for the in-memory voucher store.
    #[serde(default)]
    pub vouchers: Vec<VoucherRecord>,
    #[serde(default)]
    pub assessor: AssessorSettings,
}

/// `[redemption]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionSettings {
    #[serde(default = "default_fee")]
    pub fee: Decimal,
    /// `None` allows unlimited retries.
    #[serde(default)]
    pub max_auth_attempts: Option<u32>,
}

impl Default for RedemptionSettings {
    fn default() -> Self {
        Self {
            fee: DEFAULT_FEE,
            max_auth_attempts: None,
        }
    }
}

fn default_fee() -> Decimal {
    DEFAULT_FEE
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessorKind {
    #[default]
    Heuristic,
    Anthropic,
}

/// `[assessor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessorSettings {
    #[serde(default)]
    pub kind: AssessorKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on one assessment. `0` disables the timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for AssessorSettings {
    fn default() -> Self {
        Self {
            kind: AssessorKind::default(),
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl AssessorSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> usize {
    2
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("could not parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("invalid fee: {0}")]
    Fee(FeeError),

    /// A seeded voucher could never be redeemed. Startup aborts.
    #[error("voucher {voucher} ({provider}): fee {fee} is not below amount {amount}")]
    FeeExceedsAmount {
        voucher: String,
        provider: String,
        fee: Decimal,
        amount: Decimal,
    },

    /// Amounts are whole cents; nothing is rounded on load.
    #[error("voucher {voucher} ({provider}): amount {amount} has more than 2 decimal places")]
    AmountPrecision {
        voucher: String,
        provider: String,
        amount: Decimal,
    },

    #[error("max_auth_attempts must be at least 1 (omit it for no limit)")]
    ZeroAuthAttempts,

    #[error("voucher {0} is not 10-12 digits")]
    MalformedVoucher(String),

    #[error("voucher {0} is listed more than once")]
    DuplicateVoucher(String),

    #[error("no [credential] section configured")]
    MissingCredential,
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Load `path`, or the bundled example when `path` is `None`, and validate it.
pub fn load(path: Option<&Path>) -> Result<VaultConfig, ConfigError> {
    let config = match path {
        Some(path) => read_config(path)?,
        None => parse_config(EXAMPLE_CONFIG, "bundled example config")?,
    };
    config.validate()?;
    Ok(config)
}

pub fn read_config(path: &Path) -> Result<VaultConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_config(&content, &format!("'{}'", path.display()))
}

pub fn parse_config(content: &str, origin: &str) -> Result<VaultConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })
}

impl VaultConfig {
    /// Check the seed data against the fee. Voucher codes in errors are
    /// fingerprinted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fees = self.fee_policy()?;
        if self.redemption.max_auth_attempts == Some(0) {
            return Err(ConfigError::ZeroAuthAttempts);
        }
        let mut seen = BTreeSet::new();
        for voucher in &self.vouchers {
            if !is_well_formed_code(&voucher.code) {
                return Err(ConfigError::MalformedVoucher(fingerprint_code(&voucher.code)));
            }
            if !seen.insert(voucher.code.as_str()) {
                return Err(ConfigError::DuplicateVoucher(fingerprint_code(&voucher.code)));
            }
            match fees.net_amount(voucher.amount) {
                Ok(_) => {}
                Err(FeeError::ExcessPrecision { .. }) => {
                    tracing::error!(
                        provider = %voucher.provider,
                        amount = %voucher.amount,
                        "seeded voucher amount is finer than a cent"
                    );
                    return Err(ConfigError::AmountPrecision {
                        voucher: fingerprint_code(&voucher.code),
                        provider: voucher.provider.clone(),
                        amount: voucher.amount,
                    });
                }
                Err(_) => {
                    tracing::error!(
                        provider = %voucher.provider,
                        fee = %fees.fee(),
                        amount = %voucher.amount,
                        "seeded voucher does not cover the redemption fee"
                    );
                    return Err(ConfigError::FeeExceedsAmount {
                        voucher: fingerprint_code(&voucher.code),
                        provider: voucher.provider.clone(),
                        fee: fees.fee(),
                        amount: voucher.amount,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn fee_policy(&self) -> Result<FeePolicy, ConfigError> {
        FeePolicy::new(self.redemption.fee).map_err(ConfigError::Fee)
    }

    pub fn retry_policy(&self) -> AuthRetryPolicy {
        AuthRetryPolicy {
            max_attempts: self.redemption.max_auth_attempts,
        }
    }

    pub fn credential(&self) -> Result<&Credential, ConfigError> {
        self.credential.as_ref().ok_or(ConfigError::MissingCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bundled_example_is_valid() {
        let config = load(None).unwrap();
        assert_eq!(config.redemption.fee, dec!(7.50));
        assert_eq!(config.redemption.max_auth_attempts, None);
        assert_eq!(config.vouchers.len(), 4);
        assert!(config.vouchers[3].consumed);
        assert_eq!(config.assessor.kind, AssessorKind::Heuristic);
        let credential = config.credential().unwrap();
        assert_eq!(credential.user_id, "usr_839201");
        assert!(credential.verify("123456"));
    }

    #[test]
    fn defaults_apply_to_empty_sections() {
        let config = parse_config("", "test").unwrap();
        assert_eq!(config.redemption.fee, DEFAULT_FEE);
        assert_eq!(config.retry_policy(), AuthRetryPolicy::unbounded());
        assert_eq!(config.assessor.timeout(), Some(Duration::from_secs(10)));
        assert!(matches!(
            config.credential(),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn fee_at_or_above_a_voucher_amount_aborts() {
        let config = parse_config(
            r#"
            [redemption]
            fee = "10.00"

            [[vouchers]]
            code = "1234567890"
            amount = "10.00"
            provider = "Tiny"
            "#,
            "test",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::FeeExceedsAmount { .. }));
        assert!(!err.to_string().contains("1234567890"));
    }

    #[test]
    fn malformed_and_duplicate_vouchers_are_rejected() {
        let malformed = parse_config(
            r#"
            [[vouchers]]
            code = "12a"
            amount = "10.00"
            provider = "X"
            "#,
            "test",
        )
        .unwrap();
        assert!(matches!(
            malformed.validate(),
            Err(ConfigError::MalformedVoucher(_))
        ));

        let duplicate = parse_config(
            r#"
            [[vouchers]]
            code = "1234567890"
            amount = "10.00"
            provider = "X"

            [[vouchers]]
            code = "1234567890"
            amount = "20.00"
            provider = "Y"
            "#,
            "test",
        )
        .unwrap();
        assert!(matches!(
            duplicate.validate(),
            Err(ConfigError::DuplicateVoucher(_))
        ));
    }

    #[test]
    fn negative_fee_is_rejected() {
        let config = parse_config("[redemption]\nfee = \"-1.00\"\n", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Fee(_))));
    }

    #[test]
    fn sub_cent_amounts_are_rejected() {
        let config = parse_config(
            r#"
            [[vouchers]]
            code = "1234567890"
            amount = "10.005"
            provider = "Odd"
            "#,
            "test",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            &err,
            ConfigError::AmountPrecision { amount, .. } if *amount == dec!(10.005)
        ));
        assert!(!err.to_string().contains("1234567890"));

        // 7.505 must not collapse onto the 7.50 fee and pass as a fee error.
        let near_fee = parse_config(
            r#"
            [[vouchers]]
            code = "1234567890"
            amount = "7.505"
            provider = "Odd"
            "#,
            "test",
        )
        .unwrap();
        assert!(matches!(
            near_fee.validate(),
            Err(ConfigError::AmountPrecision { .. })
        ));

        let fee = parse_config("[redemption]\nfee = \"7.505\"\n", "test").unwrap();
        assert!(matches!(
            fee.validate(),
            Err(ConfigError::Fee(FeeError::ExcessPrecision { .. }))
        ));
    }

    #[test]
    fn zero_auth_attempts_is_rejected() {
        let config = parse_config("[redemption]\nmax_auth_attempts = 0\n", "test").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroAuthAttempts)
        ));
        let one = parse_config("[redemption]\nmax_auth_attempts = 1\n", "test").unwrap();
        assert!(one.validate().is_ok());
    }

    #[test]
    fn retry_limit_and_assessor_are_read() {
        let config = parse_config(
            r#"
            [redemption]
            max_auth_attempts = 3

            [assessor]
            kind = "anthropic"
            timeout_ms = 0
            "#,
            "test",
        )
        .unwrap();
        assert_eq!(config.retry_policy(), AuthRetryPolicy::limited(3));
        assert_eq!(config.assessor.kind, AssessorKind::Anthropic);
        assert_eq!(config.assessor.timeout(), None);
        assert_eq!(config.assessor.max_retries, 2);
    }
}
