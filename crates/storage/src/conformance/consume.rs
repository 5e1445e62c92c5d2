use std::future::Future;

use super::{make_voucher, seeded, TestResult};
use crate::{StorageError, VoucherStore};

pub(super) async fn run_consume_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "consume",
            "mark_consumed_sets_flag",
            mark_consumed_sets_flag(factory).await,
        ),
        TestResult::from_result(
            "consume",
            "second_mark_consumed_is_replay",
            second_mark_consumed_is_replay(factory).await,
        ),
        TestResult::from_result(
            "consume",
            "seeded_consumed_voucher_rejects_mark",
            seeded_consumed_voucher_rejects_mark(factory).await,
        ),
        TestResult::from_result(
            "consume",
            "mark_unknown_code_is_not_found",
            mark_unknown_code_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "consume",
            "consuming_one_leaves_others",
            consuming_one_leaves_others(factory).await,
        ),
    ]
}

async fn mark_consumed_sets_flag<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(factory, vec![make_voucher("1234567890", 50000)]).await?;
    store
        .mark_consumed("1234567890")
        .await
        .map_err(|e| format!("mark_consumed: {e}"))?;
    let record = store
        .lookup("1234567890")
        .await
        .map_err(|e| format!("lookup: {e}"))?;
    if !record.consumed {
        return Err("voucher not consumed after mark_consumed".to_string());
    }
    Ok(())
}

async fn second_mark_consumed_is_replay<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(factory, vec![make_voucher("1234567890", 50000)]).await?;
    store
        .mark_consumed("1234567890")
        .await
        .map_err(|e| format!("first mark_consumed: {e}"))?;
    match store.mark_consumed("1234567890").await {
        Err(StorageError::AlreadyConsumed) => Ok(()),
        other => Err(format!("expected AlreadyConsumed, got {other:?}")),
    }
}

async fn seeded_consumed_voucher_rejects_mark<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut voucher = make_voucher("998877665511", 15000);
    voucher.consumed = true;
    let store = seeded(factory, vec![voucher]).await?;
    match store.mark_consumed("998877665511").await {
        Err(StorageError::AlreadyConsumed) => Ok(()),
        other => Err(format!("expected AlreadyConsumed, got {other:?}")),
    }
}

async fn mark_unknown_code_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.mark_consumed("1234567890").await {
        Err(StorageError::NotFound) => Ok(()),
        other => Err(format!("expected NotFound, got {other:?}")),
    }
}

async fn consuming_one_leaves_others<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = seeded(
        factory,
        vec![
            make_voucher("1234567890", 50000),
            make_voucher("0987654321", 25000),
        ],
    )
    .await?;
    store
        .mark_consumed("1234567890")
        .await
        .map_err(|e| format!("mark_consumed: {e}"))?;
    let other = store
        .lookup("0987654321")
        .await
        .map_err(|e| format!("lookup: {e}"))?;
    if other.consumed {
        return Err("unrelated voucher was consumed".to_string());
    }
    Ok(())
}
