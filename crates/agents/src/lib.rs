mod bootstrap;
mod config;

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use teller_core::{
    compose_envelope, normalize_text, Account, ActionClass, Adapter, EntityKind, EntityMention,
    IntentPrediction, MissingField, Outcome, ResponseEnvelope, RetrievedChunk, RouterDecision,
    RoutingError, RoutingTables, TransactionRecord,
};
use teller_ml::{EntityExtractor, IntentClassifier, SignalStack};
use teller_observability::AppMetrics;
use teller_retrieval::RetrievalGateway;
use teller_storage::LedgerRepository;
use tracing::{info, instrument, warn};

pub use bootstrap::{build_router, BootstrapOptions, DEFAULT_ACCOUNT_ID};
pub use config::RouterConfig;

/// The three collaborators the router consults but does not own.
#[derive(Clone)]
pub struct Adapters {
    pub classifier: Arc<dyn IntentClassifier>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub retrieval: Arc<dyn RetrievalGateway>,
}

impl Adapters {
    pub fn from_signals(signals: &SignalStack, retrieval: Arc<dyn RetrievalGateway>) -> Self {
        Self {
            classifier: signals.classifier.clone(),
            extractor: signals.extractor.clone(),
            retrieval,
        }
    }
}

#[derive(Default)]
struct Trace {
    action_class: Option<ActionClass>,
    raw_intent: Option<IntentPrediction>,
    resolved_intent: Option<IntentPrediction>,
    corrected: bool,
    entities: Vec<EntityMention>,
}

impl Trace {
    fn into_decision(self, account_id: &str, outcome: Outcome) -> RouterDecision {
        RouterDecision {
            account_id: account_id.to_string(),
            action_class: self.action_class,
            raw_intent: self.raw_intent,
            resolved_intent: self.resolved_intent,
            corrected: self.corrected,
            entities: self.entities,
            outcome,
        }
    }
}

#[derive(Clone)]
pub struct BankingRouter<L>
where
    L: LedgerRepository,
{
    adapters: Adapters,
    tables: RoutingTables,
    ledger: Arc<L>,
    metrics: Arc<AppMetrics>,
    config: RouterConfig,
}

impl<L> BankingRouter<L>
where
    L: LedgerRepository,
{
    pub fn new(
        adapters: Adapters,
        tables: RoutingTables,
        ledger: Arc<L>,
        metrics: Arc<AppMetrics>,
        config: RouterConfig,
    ) -> Self {
        Self {
            adapters,
            tables,
            ledger,
            metrics,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn tables(&self) -> &RoutingTables {
        &self.tables
    }

    /// Routes one message end to end. Every failure is folded into the
    /// envelope; this never returns an error and never retries.
    #[instrument(skip(self, text))]
    pub async fn handle(&self, account_id: &str, text: &str) -> ResponseEnvelope {
        let started = Instant::now();
        self.metrics.inc_request();

        let mut trace = Trace::default();
        let outcome = match self.route(account_id, text, &mut trace).await {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Declined { error },
        };
        let decision = trace.into_decision(account_id, outcome);

        self.record_outcome(&decision.outcome);
        self.metrics.observe_latency(started.elapsed());
        info!(
            account_id,
            action_class = decision.action_class.map(ActionClass::as_str),
            resolved_intent = decision
                .resolved_intent
                .as_ref()
                .map(|intent| intent.label.as_str()),
            corrected = decision.corrected,
            outcome = decision.outcome.kind(),
            "request handled"
        );

        compose_envelope(decision)
    }

    /// Transfer with an already-known recipient and amount, bypassing the
    /// signal adapters. Used by operator tooling.
    pub async fn transfer_funds(
        &self,
        account_id: &str,
        counterparty: &str,
        amount: Decimal,
    ) -> ResponseEnvelope {
        self.metrics.inc_request();
        let outcome = match self.ledger.transfer(account_id, counterparty, amount).await {
            Ok(transaction) => Outcome::Committed { transaction },
            Err(err) => Outcome::Declined { error: err.into() },
        };
        self.record_outcome(&outcome);

        let trace = Trace {
            action_class: Some(ActionClass::TransferAction),
            ..Trace::default()
        };
        compose_envelope(trace.into_decision(account_id, outcome))
    }

    pub async fn open_account(
        &self,
        account_id: &str,
        opening_balance: Decimal,
    ) -> Result<Account, RoutingError> {
        Ok(self
            .ledger
            .open_account(account_id, opening_balance)
            .await?)
    }

    pub async fn account(&self, account_id: &str) -> Result<Option<Account>, RoutingError> {
        Ok(self.ledger.account(account_id).await?)
    }

    pub async fn history(&self, account_id: &str) -> Result<Vec<TransactionRecord>, RoutingError> {
        Ok(self.ledger.history(account_id).await?)
    }

    pub async fn kb_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RoutingError> {
        let retrieval = self.adapters.retrieval.clone();
        let query = normalize_text(query);
        self.call_adapter(Adapter::RetrievalGateway, move || {
            retrieval.search_limited(&query, limit)
        })
        .await
    }

    async fn route(
        &self,
        account_id: &str,
        text: &str,
        trace: &mut Trace,
    ) -> Result<Outcome, RoutingError> {
        let normalized = normalize_text(text);

        let (intent, entities) = tokio::join!(
            self.classify_intent(&normalized),
            self.extract_entities(&normalized)
        );
        let intent = intent?;
        trace.raw_intent = Some(intent.clone());
        let entities = entities?;
        trace.entities = entities.clone();

        let resolved = self
            .tables
            .correction
            .correct_with_text(&intent, &entities, &normalized);
        trace.corrected = resolved.label != intent.label;
        if trace.corrected {
            info!(
                raw_intent = intent.label.as_str(),
                resolved_intent = resolved.label.as_str(),
                "intent corrected"
            );
        }

        let action_class = self.tables.registry.classify(&resolved);
        trace.resolved_intent = Some(resolved);
        trace.action_class = Some(action_class);

        match action_class {
            ActionClass::SafetyAction => self.apply_safety_action(account_id).await,
            ActionClass::TransferAction => self.execute_transfer(account_id, &entities).await,
            ActionClass::InformationalQuery => self.answer_from_policy(&normalized).await,
        }
    }

    async fn apply_safety_action(&self, account_id: &str) -> Result<Outcome, RoutingError> {
        let account = self.ledger.freeze(account_id).await?;
        warn!(account_id = %account.id, "account frozen by safety action");
        Ok(Outcome::Frozen {
            account_id: account.id,
        })
    }

    async fn execute_transfer(
        &self,
        account_id: &str,
        entities: &[EntityMention],
    ) -> Result<Outcome, RoutingError> {
        let recipient = entities
            .iter()
            .find(|entity| entity.kind == EntityKind::Person)
            .map(|entity| entity.value.clone());
        let amount = entities.iter().find_map(EntityMention::amount_value);

        let (recipient, amount) = match (recipient, amount) {
            (Some(recipient), Some(amount)) => (recipient, amount),
            (recipient, amount) => {
                return Err(self.missing_entity(account_id, recipient, amount).await)
            }
        };

        let transaction = self.ledger.transfer(account_id, &recipient, amount).await?;
        Ok(Outcome::Committed { transaction })
    }

    async fn missing_entity(
        &self,
        account_id: &str,
        recipient: Option<String>,
        amount: Option<Decimal>,
    ) -> RoutingError {
        let mut missing = Vec::new();
        if recipient.is_none() {
            missing.push(MissingField::Recipient);
        }
        if amount.is_none() {
            missing.push(MissingField::Amount);
        }
        let balance = self
            .ledger
            .account(account_id)
            .await
            .ok()
            .flatten()
            .map(|account| account.balance);
        RoutingError::MissingEntity {
            missing,
            recipient,
            balance,
        }
    }

    async fn answer_from_policy(&self, normalized: &str) -> Result<Outcome, RoutingError> {
        let hits = self
            .kb_search(normalized, self.config.retrieval_top_k)
            .await?;
        let threshold = self.config.retrieval_min_score;

        match hits.into_iter().next() {
            Some(top) if top.score >= threshold => Ok(Outcome::Answered { chunk: top }),
            top => Err(RoutingError::LowConfidenceRetrieval {
                best_score: top.map(|chunk| chunk.score),
                threshold,
            }),
        }
    }

    async fn classify_intent(&self, text: &str) -> Result<IntentPrediction, RoutingError> {
        let classifier = self.adapters.classifier.clone();
        let text = text.to_string();
        self.call_adapter(Adapter::IntentClassifier, move || classifier.classify(&text))
            .await
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<EntityMention>, RoutingError> {
        let extractor = self.adapters.extractor.clone();
        let text = text.to_string();
        self.call_adapter(Adapter::EntityExtractor, move || extractor.extract(&text))
            .await
    }

    /// Runs a blocking adapter call on the blocking pool under the configured
    /// deadline. A call that overruns is abandoned, not cancelled.
    async fn call_adapter<T, F>(&self, adapter: Adapter, work: F) -> Result<T, RoutingError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let deadline = self.config.adapter_timeout;
        match tokio::time::timeout(deadline, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => {
                warn!(%adapter, error = %err, "adapter failed");
                Err(RoutingError::AdapterFailure {
                    adapter,
                    reason: format!("{err:#}"),
                })
            }
            Ok(Err(join_err)) => {
                warn!(%adapter, error = %join_err, "adapter task aborted");
                Err(RoutingError::AdapterFailure {
                    adapter,
                    reason: join_err.to_string(),
                })
            }
            Err(_) => {
                warn!(%adapter, timeout_ms = deadline.as_millis() as u64, "adapter timed out");
                Err(RoutingError::AdapterTimeout {
                    adapter,
                    timeout_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    fn record_outcome(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Frozen { .. } => self.metrics.inc_safety_action(),
            Outcome::Committed { .. } => self.metrics.inc_transfer_committed(),
            Outcome::Answered { .. } => self.metrics.inc_retrieval_answered(),
            Outcome::Declined { error } => match error {
                RoutingError::InsufficientFunds { .. } | RoutingError::AccountFrozen { .. } => {
                    self.metrics.inc_transfer_rejected()
                }
                RoutingError::MissingEntity { .. } => self.metrics.inc_missing_entity(),
                RoutingError::LowConfidenceRetrieval { .. } => self.metrics.inc_retrieval_miss(),
                RoutingError::AdapterTimeout { .. } | RoutingError::AdapterFailure { .. } => {
                    self.metrics.inc_adapter_failure()
                }
                _ => {}
            },
        }
    }
}
