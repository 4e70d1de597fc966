use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use teller_agents::{Adapters, BankingRouter, RouterConfig};
use teller_core::{
    ActionClass, IntentLabel, Outcome, ResponseStatus, RoutingError, RoutingTables,
    TransactionStatus,
};
use teller_ml::SignalStack;
use teller_observability::AppMetrics;
use teller_retrieval::{HybridRetriever, RetrievalGateway};
use teller_storage::{LedgerRepository, MemoryStore};

fn kb_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kb")
}

async fn rule_router() -> BankingRouter<MemoryStore> {
    let signals = SignalStack::rules_only();
    let retriever = HybridRetriever::from_kb_dir(kb_root(), Some(signals.embedder.clone()))
        .expect("kb should load");
    let retrieval: Arc<dyn RetrievalGateway> = Arc::new(retriever);

    let ledger = Arc::new(MemoryStore::new());
    ledger
        .open_account("primary", dec!(5000.00))
        .await
        .expect("account opens");

    BankingRouter::new(
        Adapters::from_signals(&signals, retrieval),
        RoutingTables::default(),
        ledger,
        AppMetrics::shared(),
        RouterConfig::default().with_adapter_timeout(Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn transfer_then_overdraft_leaves_two_records() {
    let router = rule_router().await;

    let first = router.handle("primary", "Send $100 to John").await;
    assert_eq!(first.status, ResponseStatus::Ok);
    assert_eq!(first.message, "Transfer complete: sent $100.00 to John. New balance: $4900.00.");

    let second = router.handle("primary", "Transfer $10000 to Sarah").await;
    assert_eq!(second.status, ResponseStatus::Rejected);
    assert!(matches!(
        second.decision.outcome,
        Outcome::Declined {
            error: RoutingError::InsufficientFunds { .. }
        }
    ));

    let history = router.history("primary").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, TransactionStatus::Committed);
    assert_eq!(history[1].status, TransactionStatus::Rejected);
    assert_eq!(history[1].counterparty, "Sarah");
    assert_eq!(history[1].balance_after, dec!(4900.00));
    assert_eq!(
        router.account("primary").await.unwrap().unwrap().balance,
        dec!(4900.00)
    );
}

#[tokio::test]
async fn lost_card_freezes_and_blocks_later_transfers() {
    let router = rule_router().await;

    let alert = router.handle("primary", "Help, I lost my card").await;
    assert_eq!(alert.decision.action_class, Some(ActionClass::SafetyAction));
    assert_eq!(alert.side_effects.frozen, Some(true));
    assert!(router.history("primary").await.unwrap().is_empty());

    let blocked = router.handle("primary", "Send $20 to John").await;
    assert_eq!(blocked.status, ResponseStatus::Rejected);
    assert!(matches!(
        blocked.decision.outcome,
        Outcome::Declined {
            error: RoutingError::AccountFrozen { .. }
        }
    ));
    assert_eq!(
        router.account("primary").await.unwrap().unwrap().balance,
        dec!(5000.00)
    );
}

#[tokio::test]
async fn complaint_naming_a_person_is_treated_as_transfer() {
    let router = rule_router().await;

    let envelope = router
        .handle(
            "primary",
            "My balance wasn't updated after I sent money to David",
        )
        .await;
    let decision = &envelope.decision;

    assert_eq!(
        decision.raw_intent.as_ref().map(|intent| &intent.label),
        Some(&IntentLabel::BalanceNotUpdatedAfterBankTransfer)
    );
    assert!(decision.corrected);
    assert_eq!(decision.action_class, Some(ActionClass::TransferAction));
    assert_eq!(envelope.status, ResponseStatus::Rejected);
    assert_eq!(
        envelope.message,
        "I can help transfer funds to David. Please specify an amount (e.g., $500). Current balance: $5000.00."
    );
    assert!(router.history("primary").await.unwrap().is_empty());
}

#[tokio::test]
async fn complaint_without_evidence_stays_informational() {
    let router = rule_router().await;

    let envelope = router
        .handle("primary", "my balance wasn't updated after a bank transfer")
        .await;
    assert!(!envelope.decision.corrected);
    assert_eq!(
        envelope.decision.action_class,
        Some(ActionClass::InformationalQuery)
    );
    assert_eq!(envelope.status, ResponseStatus::Ok);
}

#[tokio::test]
async fn policy_question_is_answered_from_the_corpus() {
    let router = rule_router().await;

    let envelope = router
        .handle("primary", "when will my card delivery arrive?")
        .await;
    assert_eq!(envelope.status, ResponseStatus::Ok);
    assert!(envelope.message.starts_with("Policy info: Card delivery"));
    assert!(matches!(envelope.decision.outcome, Outcome::Answered { .. }));
}

#[tokio::test]
async fn off_topic_question_gets_the_no_information_reply() {
    let router = rule_router().await;

    let envelope = router.handle("primary", "recommend a good pizza recipe").await;
    assert_eq!(envelope.status, ResponseStatus::Ok);
    assert_eq!(
        envelope.message,
        "I checked the policy documents but found no specific answer."
    );
    assert_eq!(router.metrics().snapshot().retrieval_miss_total, 1);
}

async fn trained_router() -> BankingRouter<MemoryStore> {
    let signals = SignalStack::from_dataset(kb_root().join("training/intents.jsonl"));
    let retriever = HybridRetriever::from_kb_dir(kb_root(), Some(signals.embedder.clone()))
        .expect("kb should load");
    let ledger = Arc::new(MemoryStore::new());
    ledger.open_account("primary", dec!(5000.00)).await.unwrap();
    BankingRouter::new(
        Adapters::from_signals(&signals, Arc::new(retriever)),
        RoutingTables::default(),
        ledger,
        AppMetrics::shared(),
        RouterConfig::default(),
    )
}

#[tokio::test]
async fn trained_dataset_keeps_command_routing_intact() {
    let router = trained_router().await;

    let envelope = router.handle("primary", "pay Maria 40").await;
    assert_eq!(envelope.status, ResponseStatus::Ok);
    assert_eq!(
        envelope.side_effects.transaction.map(|record| record.amount),
        Some(dec!(40))
    );
}

#[tokio::test]
async fn harmless_card_and_phone_questions_never_freeze() {
    let router = trained_router().await;

    for text in [
        "I found my card",
        "can I use my card in Japan",
        "does my phone app support dark mode",
    ] {
        let envelope = router.handle("primary", text).await;
        assert_ne!(
            envelope.decision.action_class,
            Some(ActionClass::SafetyAction),
            "{text}"
        );
        assert_eq!(envelope.side_effects.frozen, None, "{text}");
    }
    assert!(!router.account("primary").await.unwrap().unwrap().frozen);

    let alert = router.handle("primary", "my card was stolen").await;
    assert_eq!(alert.side_effects.frozen, Some(true));
}

#[tokio::test]
async fn garbled_amounts_ask_for_clarification_instead_of_moving_money() {
    let router = rule_router().await;

    for text in [
        "send 5e3 to John",
        "send 100k to John",
        "send $-50 to John",
        "Send 10:30 to John",
    ] {
        let envelope = router.handle("primary", text).await;
        assert_eq!(envelope.status, ResponseStatus::Rejected, "{text}");
        assert!(
            matches!(
                &envelope.decision.outcome,
                Outcome::Declined {
                    error: RoutingError::MissingEntity { .. }
                }
            ),
            "{text}"
        );
        assert!(envelope.side_effects.transaction.is_none(), "{text}");
    }

    assert!(router.history("primary").await.unwrap().is_empty());
    assert_eq!(
        router.account("primary").await.unwrap().unwrap().balance,
        dec!(5000.00)
    );
}
