//! In-memory `VoucherStore` backed by a single-lock keyed map.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::VoucherRecord;
use crate::traits::VoucherStore;

/// A process-local voucher store.
///
/// All vouchers live in one `BTreeMap` guarded by one `Mutex`, so the
/// consumed check and the flip in `mark_consumed` happen under the same
/// critical section.
#[derive(Debug, Default)]
pub struct InMemoryVoucherStore {
    vouchers: Mutex<BTreeMap<String, VoucherRecord>>,
}

impl InMemoryVoucherStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-seeded with `records`.
    ///
    /// Later duplicates of a code replace earlier ones.
    pub fn with_vouchers(records: impl IntoIterator<Item = VoucherRecord>) -> Self {
        let vouchers = records
            .into_iter()
            .map(|r| (r.code.clone(), r))
            .collect::<BTreeMap<_, _>>();
        Self {
            vouchers: Mutex::new(vouchers),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, BTreeMap<String, VoucherRecord>>, StorageError> {
        self.vouchers
            .lock()
            .map_err(|e| StorageError::Backend(format!("voucher map lock poisoned: {}", e)))
    }
}

#[async_trait]
impl VoucherStore for InMemoryVoucherStore {
    async fn lookup(&self, code: &str) -> Result<VoucherRecord, StorageError> {
        self.guard()?.get(code).cloned().ok_or(StorageError::NotFound)
    }

    async fn mark_consumed(&self, code: &str) -> Result<(), StorageError> {
        let mut vouchers = self.guard()?;
        let voucher = vouchers.get_mut(code).ok_or(StorageError::NotFound)?;
        if voucher.consumed {
            return Err(StorageError::AlreadyConsumed);
        }
        voucher.consumed = true;
        tracing::debug!(provider = %voucher.provider, "voucher marked consumed");
        Ok(())
    }

    async fn insert(&self, record: VoucherRecord) -> Result<(), StorageError> {
        let mut vouchers = self.guard()?;
        if vouchers.contains_key(&record.code) {
            return Err(StorageError::AlreadyExists { code: record.code });
        }
        vouchers.insert(record.code.clone(), record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<VoucherRecord>, StorageError> {
        Ok(self.guard()?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn seeded() -> InMemoryVoucherStore {
        InMemoryVoucherStore::with_vouchers(vec![
            VoucherRecord::new("1234567890", dec!(500.00), "FNB eWallet"),
            VoucherRecord {
                consumed: true,
                ..VoucherRecord::new("998877665511", dec!(150.00), "Capitec Send")
            },
        ])
    }

    #[tokio::test]
    async fn lookup_does_not_consume() {
        let store = seeded();
        let first = store.lookup("1234567890").await.unwrap();
        let second = store.lookup("1234567890").await.unwrap();
        assert!(!first.consumed);
        assert!(!second.consumed);
        assert_eq!(second.amount, dec!(500.00));
    }

    #[tokio::test]
    async fn lookup_unknown_code() {
        let store = seeded();
        assert_eq!(
            store.lookup("0000000000").await.unwrap_err(),
            StorageError::NotFound
        );
    }

    #[tokio::test]
    async fn second_mark_consumed_is_rejected() {
        let store = seeded();
        store.mark_consumed("1234567890").await.unwrap();
        assert_eq!(
            store.mark_consumed("1234567890").await.unwrap_err(),
            StorageError::AlreadyConsumed
        );
        assert!(store.lookup("1234567890").await.unwrap().consumed);
    }

    #[tokio::test]
    async fn mark_consumed_unknown_code() {
        let store = seeded();
        assert_eq!(
            store.mark_consumed("0000000000").await.unwrap_err(),
            StorageError::NotFound
        );
    }

    #[tokio::test]
    async fn pre_consumed_voucher_cannot_be_consumed() {
        let store = seeded();
        assert_eq!(
            store.mark_consumed("998877665511").await.unwrap_err(),
            StorageError::AlreadyConsumed
        );
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_code() {
        let store = seeded();
        let err = store
            .insert(VoucherRecord::new("1234567890", dec!(10.00), "Other"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::AlreadyExists {
                code: "1234567890".to_string()
            }
        );
        store
            .insert(VoucherRecord::new("1122334455", dec!(1000.00), "Standard Bank"))
            .await
            .unwrap();
        let codes: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.code)
            .collect();
        assert_eq!(codes, vec!["1122334455", "1234567890", "998877665511"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mark_consumed_has_one_winner() {
        let store = Arc::new(seeded());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.mark_consumed("1234567890").await
            }));
        }
        let mut wins = 0;
        let mut replays = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(StorageError::AlreadyConsumed) => replays += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(replays, 15);
    }
}
