use std::future::Future;

use rust_decimal::Decimal;

use super::{make_voucher, seeded, TestResult};
use crate::{StorageError, VoucherStore};

pub(super) async fn run_lookup_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "lookup",
            "lookup_returns_seeded_voucher",
            lookup_returns_seeded_voucher(factory).await,
        ),
        TestResult::from_result(
            "lookup",
            "lookup_unknown_code_is_not_found",
            lookup_unknown_code_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "lookup",
            "lookup_does_not_consume",
            lookup_does_not_consume(factory).await,
        ),
    ]
}

async fn lookup_returns_seeded_voucher<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(factory, vec![make_voucher("1234567890", 50000)]).await?;
    let record = store
        .lookup("1234567890")
        .await
        .map_err(|e| format!("lookup: {e}"))?;

    if record.code != "1234567890" {
        return Err(format!("wrong code: {}", record.code));
    }
    if record.amount != Decimal::new(50000, 2) {
        return Err(format!("wrong amount: {}", record.amount));
    }
    if record.consumed {
        return Err("fresh voucher reported consumed".to_string());
    }
    Ok(())
}

async fn lookup_unknown_code_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(factory, vec![make_voucher("1234567890", 50000)]).await?;
    match store.lookup("0000000000").await {
        Err(StorageError::NotFound) => Ok(()),
        other => Err(format!("expected NotFound, got {other:?}")),
    }
}

async fn lookup_does_not_consume<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(factory, vec![make_voucher("1234567890", 50000)]).await?;
    for _ in 0..3 {
        store
            .lookup("1234567890")
            .await
            .map_err(|e| format!("lookup: {e}"))?;
    }
    store
        .mark_consumed("1234567890")
        .await
        .map_err(|e| format!("mark_consumed after reads: {e}"))
}
