use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use teller_core::TransactionStatus;
use teller_storage::{LedgerError, LedgerRepository, Store};

async fn drain_concurrently(store: Store) {
    let store = Arc::new(store);
    store.open_account("shared", dec!(1000.00)).await.unwrap();

    let tasks = (0..40).map(|idx| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .transfer("shared", &format!("payee-{idx}"), dec!(75.00))
                .await
        })
    });
    let results = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task completes"))
        .collect::<Vec<_>>();

    let committed = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(committed, 13);
    assert!(results.iter().all(|result| match result {
        Ok(_) => true,
        Err(LedgerError::InsufficientFunds { .. }) => true,
        Err(other) => panic!("unexpected ledger error: {other}"),
    }));

    let account = store.account("shared").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(25.00));

    let history = store.history("shared").await.unwrap();
    assert_eq!(history.len(), 40);
    let sequences = history.iter().map(|record| record.sequence).collect::<BTreeSet<_>>();
    assert_eq!(sequences, (1..=40).collect::<BTreeSet<_>>());

    // Replaying committed records in sequence order reproduces every snapshot.
    let mut running = dec!(1000.00);
    for record in &history {
        if record.status == TransactionStatus::Committed {
            running -= record.amount;
        }
        assert_eq!(record.balance_after, running);
        assert!(record.balance_after >= Decimal::ZERO);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_ledger_never_overdraws_under_contention() {
    drain_concurrently(Store::memory()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_ledger_never_overdraws_under_contention() {
    let store = Store::sqlite("sqlite::memory:").await.expect("sqlite opens");
    drain_concurrently(store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfers_on_different_accounts_do_not_interfere() {
    let store = Arc::new(Store::memory());
    store.open_account("alpha", dec!(100.00)).await.unwrap();
    store.open_account("beta", dec!(100.00)).await.unwrap();

    let tasks = ["alpha", "beta"].into_iter().flat_map(|account| {
        let store = Arc::clone(&store);
        (0..10).map(move |_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.transfer(account, "payee", dec!(10.00)).await })
        })
    });
    for joined in join_all(tasks).await {
        joined.expect("task completes").expect("transfer commits");
    }

    for account in ["alpha", "beta"] {
        let snapshot = store.account(account).await.unwrap().unwrap();
        assert_eq!(snapshot.balance, Decimal::ZERO);
        assert_eq!(store.history(account).await.unwrap().len(), 10);
    }
}
