use std::future::Future;
use std::sync::Arc;

use super::{make_voucher, seeded, TestResult};
use crate::{StorageError, VoucherStore};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_consume_exactly_one_wins",
            concurrent_consume_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_insert_exactly_one_wins",
            concurrent_insert_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_consume_different_codes_all_succeed",
            concurrent_consume_different_codes_all_succeed(factory).await,
        ),
    ]
}

/// Tally spawned race outcomes: `Ok(true)` won, `Ok(false)` lost.
async fn tally(
    handles: Vec<tokio::task::JoinHandle<Result<bool, StorageError>>>,
) -> Result<(usize, usize), String> {
    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }
    Ok((winners, losers))
}

// ── Concurrent consume: exactly one wins ────────────────────────────────────

/// N tasks race to consume the same voucher. Exactly one succeeds; the rest
/// must get AlreadyConsumed.
async fn concurrent_consume_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(seeded(factory, vec![make_voucher("1234567890", 50000)]).await?);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            match s.mark_consumed("1234567890").await {
                Ok(()) => Ok(true),
                Err(StorageError::AlreadyConsumed) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let (winners, losers) = tally(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Concurrent insert: exactly one wins ─────────────────────────────────────

async fn concurrent_insert_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            match s.insert(make_voucher("1234567890", 100 + i as i64)).await {
                Ok(()) => Ok(true),
                Err(StorageError::AlreadyExists { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let (winners, losers) = tally(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Concurrent consume of different codes: all succeed ──────────────────────

/// No false conflicts when there is no contention.
async fn concurrent_consume_different_codes_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: VoucherStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let codes: Vec<String> = (0..N).map(|i| format!("10000000{i:02}")).collect();
    let vouchers = codes.iter().map(|c| make_voucher(c, 10000)).collect();
    let store = Arc::new(seeded(factory, vouchers).await?);

    let mut handles = Vec::new();
    for code in codes.clone() {
        let s = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            s.mark_consumed(&code).await.map(|()| true)
        }));
    }

    let (winners, _) = tally(handles).await?;
    if winners != N {
        return Err(format!("expected {N} successes, got {winners}"));
    }
    for code in &codes {
        let record = store
            .lookup(code)
            .await
            .map_err(|e| format!("lookup {code}: {e}"))?;
        if !record.consumed {
            return Err(format!("{code} not consumed"));
        }
    }
    Ok(())
}
