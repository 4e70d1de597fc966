use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use teller_core::{ActionClass, RoutingTables};
use teller_ml::SignalStack;
use teller_observability::AppMetrics;
use teller_retrieval::HybridRetriever;
use teller_storage::{LedgerRepository, Store};
use tracing::info;

use crate::config::env_parse;
use crate::{Adapters, BankingRouter, RouterConfig};

pub const DEFAULT_ACCOUNT_ID: &str = "primary";

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub kb_root: PathBuf,
    pub database_url: Option<String>,
    pub account_id: String,
    pub opening_balance: Decimal,
    pub registry_path: Option<PathBuf>,
    pub router: RouterConfig,
}

impl BootstrapOptions {
    pub fn new(kb_root: impl Into<PathBuf>) -> Self {
        Self {
            kb_root: kb_root.into(),
            database_url: None,
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            opening_balance: Decimal::new(500_000, 2),
            registry_path: None,
            router: RouterConfig::default(),
        }
    }

    pub fn from_env(kb_root: impl Into<PathBuf>) -> Self {
        let mut options = Self::new(kb_root);
        options.database_url = env::var("TELLER_DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        if let Ok(account_id) = env::var("TELLER_ACCOUNT_ID") {
            if !account_id.trim().is_empty() {
                options.account_id = account_id.trim().to_string();
            }
        }
        if let Some(balance) = env_parse::<Decimal>("TELLER_OPENING_BALANCE") {
            options.opening_balance = balance;
        }
        options.registry_path = env::var("TELLER_REGISTRY_PATH").ok().map(PathBuf::from);
        options.router = RouterConfig::from_env();
        options
    }
}

/// Wires adapters, routing tables and the ledger, and opens the default account.
pub async fn build_router(options: &BootstrapOptions) -> Result<BankingRouter<Store>> {
    let tables = match &options.registry_path {
        Some(path) => RoutingTables::from_json_file(path)?,
        None => RoutingTables::default(),
    };
    let signals = SignalStack::load_guarded(
        tables
            .registry
            .labels_for(ActionClass::SafetyAction)
            .into_iter()
            .cloned(),
    );

    let retriever = HybridRetriever::from_kb_dir(&options.kb_root, Some(signals.embedder.clone()))
        .with_context(|| format!("failed loading knowledge base at {}", options.kb_root.display()))?
        .with_top_k(options.router.retrieval_top_k);
    let stats = retriever.stats();

    let store = Store::from_database_url(options.database_url.as_deref()).await?;
    store
        .open_account(&options.account_id, options.opening_balance)
        .await
        .with_context(|| format!("failed opening account {}", options.account_id))?;

    info!(
        backend = store.backend(),
        classifier = signals.classifier.model_name(),
        docs = stats.docs_loaded,
        chunks = stats.chunks_loaded,
        mapped_labels = tables.registry.len(),
        "router ready"
    );

    Ok(BankingRouter::new(
        Adapters::from_signals(&signals, Arc::new(retriever)),
        tables,
        Arc::new(store),
        AppMetrics::shared(),
        options.router.clone(),
    ))
}
