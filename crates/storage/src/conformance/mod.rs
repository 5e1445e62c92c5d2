//! Conformance test suite for `VoucherStore` implementations.
//!
//! Any backend can run this suite to check it honors the store contract:
//!
//! - **Lookup**: seeded vouchers are readable, unknown codes are `NotFound`,
//!   and reads never consume
//! - **Consume**: `mark_consumed` flips the flag once and rejects replays
//! - **Insert/list**: duplicate codes are rejected, listings are ordered
//! - **Concurrency**: of N racing consumers of one code, exactly one wins
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory that creates
//! a fresh, empty store for each test:
//!
//! ```ignore
//! use vault_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod consume;
mod insert;
mod lookup;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;

use crate::record::VoucherRecord;
use crate::VoucherStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "lookup", "consume").
    pub category: String,
    /// Test name (e.g. "lookup_does_not_consume").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` is called once per test and must return an empty store.
/// The concurrency tests spawn tasks, so run this on a multi-thread runtime
/// to get real contention.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(lookup::run_lookup_tests(&factory).await);
    results.extend(consume::run_consume_tests(&factory).await);
    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_voucher(code: &str, cents: i64) -> VoucherRecord {
    VoucherRecord::new(code, Decimal::new(cents, 2), "Conformance Provider")
}

/// Create a store from `factory` and seed it with `vouchers`.
async fn seeded<S, F, Fut>(factory: &F, vouchers: Vec<VoucherRecord>) -> Result<S, String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for voucher in vouchers {
        store
            .insert(voucher)
            .await
            .map_err(|e| format!("seed insert: {e}"))?;
    }
    Ok(store)
}
