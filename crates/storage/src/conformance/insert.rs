use std::future::Future;

use super::{make_voucher, seeded, TestResult};
use crate::{StorageError, VoucherStore};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "insert",
            "duplicate_insert_is_rejected",
            duplicate_insert_is_rejected(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "list_is_ordered_by_code",
            list_is_ordered_by_code(factory).await,
        ),
        TestResult::from_result(
            "insert",
            "empty_store_lists_nothing",
            empty_store_lists_nothing(factory).await,
        ),
    ]
}

async fn duplicate_insert_is_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(factory, vec![make_voucher("1234567890", 50000)]).await?;
    match store.insert(make_voucher("1234567890", 100)).await {
        Err(StorageError::AlreadyExists { .. }) => {}
        other => return Err(format!("expected AlreadyExists, got {other:?}")),
    }
    // The original record is untouched.
    let record = store
        .lookup("1234567890")
        .await
        .map_err(|e| format!("lookup: {e}"))?;
    if record.amount != make_voucher("1234567890", 50000).amount {
        return Err(format!("duplicate insert overwrote amount: {}", record.amount));
    }
    Ok(())
}

async fn list_is_ordered_by_code<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(
        factory,
        vec![
            make_voucher("998877665511", 15000),
            make_voucher("0987654321", 25000),
            make_voucher("1234567890", 50000),
        ],
    )
    .await?;
    let codes: Vec<String> = store
        .list()
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|r| r.code)
        .collect();
    let expected = vec!["0987654321", "1234567890", "998877665511"];
    if codes != expected {
        return Err(format!("expected {expected:?}, got {codes:?}"));
    }
    Ok(())
}

async fn empty_store_lists_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let all = store.list().await.map_err(|e| format!("list: {e}"))?;
    if !all.is_empty() {
        return Err(format!("expected empty listing, got {} records", all.len()));
    }
    Ok(())
}
