mod centroid;
mod entities;
mod fallback;
mod rules;

use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use teller_core::{ActionClass, ActionRegistry, EntityMention, IntentLabel, IntentPrediction};
use teller_retrieval::EmbeddingModel;

pub use centroid::CentroidIntentClassifier;
pub use entities::RuleEntityExtractor;
pub use fallback::HashEmbeddingModel;
pub use rules::classify_intent_rules;

const EMBEDDING_DIMS: usize = 192;
const RULE_CONFIDENCE: f32 = 0.62;
const NO_MATCH_CONFIDENCE: f32 = 0.30;
// (cos + 1) / 2, so the model needs a cosine of at least 0.5.
const FALLBACK_MIN_CONFIDENCE: f32 = 0.75;

/// Maps a message to one Banking77 label. Implementations are synchronous and
/// may block; the router runs them on the blocking pool under a deadline.
pub trait IntentClassifier: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn classify(&self, text: &str) -> Result<IntentPrediction>;
}

/// Finds PERSON, AMOUNT and DATE mentions, returned in text order.
pub trait EntityExtractor: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn extract(&self, text: &str) -> Result<Vec<EntityMention>>;
}

#[derive(Debug, Default)]
pub struct RuleIntentClassifier;

impl IntentClassifier for RuleIntentClassifier {
    fn model_name(&self) -> &'static str {
        "rules"
    }

    fn classify(&self, text: &str) -> Result<IntentPrediction> {
        Ok(match classify_intent_rules(text) {
            Some(label) => IntentPrediction::new(label, RULE_CONFIDENCE),
            None => IntentPrediction::new(
                IntentLabel::Unrecognized("unknown".to_string()),
                NO_MATCH_CONFIDENCE,
            ),
        })
    }
}

/// Keyword rules first; the trained model only answers for text no rule
/// recognizes, and only when it is reasonably sure. Labels in `rule_only`
/// (by default everything routed to a safety action) are never taken from the
/// model, since acting on them cannot be undone.
pub struct LayeredIntentClassifier {
    rules: RuleIntentClassifier,
    fallback: Arc<dyn IntentClassifier>,
    min_fallback_confidence: f32,
    rule_only: HashSet<IntentLabel>,
}

impl LayeredIntentClassifier {
    pub fn new(fallback: Arc<dyn IntentClassifier>) -> Self {
        Self {
            rules: RuleIntentClassifier,
            fallback,
            min_fallback_confidence: FALLBACK_MIN_CONFIDENCE,
            rule_only: default_rule_only_labels().into_iter().collect(),
        }
    }

    pub fn with_rule_only_labels(mut self, labels: impl IntoIterator<Item = IntentLabel>) -> Self {
        self.rule_only = labels.into_iter().collect();
        self
    }
}

impl IntentClassifier for LayeredIntentClassifier {
    fn model_name(&self) -> &'static str {
        "layered"
    }

    fn classify(&self, text: &str) -> Result<IntentPrediction> {
        let ruled = self.rules.classify(text)?;
        if ruled.label.is_known() {
            return Ok(ruled);
        }

        let predicted = self.fallback.classify(text)?;
        if predicted.confidence >= self.min_fallback_confidence
            && !self.rule_only.contains(&predicted.label)
        {
            Ok(predicted)
        } else {
            Ok(ruled)
        }
    }
}

fn default_rule_only_labels() -> Vec<IntentLabel> {
    ActionRegistry::default()
        .labels_for(ActionClass::SafetyAction)
        .into_iter()
        .cloned()
        .collect()
}

#[derive(Clone)]
pub struct SignalStack {
    pub embedder: Arc<dyn EmbeddingModel>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub extractor: Arc<dyn EntityExtractor>,
}

impl SignalStack {
    /// Prefers a centroid classifier trained from `TELLER_INTENT_DATASET`,
    /// falling back to keyword rules when the dataset is absent or unusable.
    /// `rule_only` lists the labels the trained model may never produce.
    pub fn load_guarded(rule_only: impl IntoIterator<Item = IntentLabel>) -> Self {
        let dataset_path = env::var("TELLER_INTENT_DATASET")
            .unwrap_or_else(|_| "kb/training/intents.jsonl".to_string());
        Self::from_dataset_guarded(dataset_path, rule_only)
    }

    pub fn from_dataset(dataset_path: impl AsRef<Path>) -> Self {
        Self::from_dataset_guarded(dataset_path, default_rule_only_labels())
    }

    pub fn from_dataset_guarded(
        dataset_path: impl AsRef<Path>,
        rule_only: impl IntoIterator<Item = IntentLabel>,
    ) -> Self {
        let embedder = Arc::new(HashEmbeddingModel::new(EMBEDDING_DIMS));
        let path = dataset_path.as_ref();

        let classifier: Arc<dyn IntentClassifier> = if path.exists() {
            match CentroidIntentClassifier::from_jsonl(path, embedder.clone(), "centroid-intent") {
                Ok(clf) => Arc::new(
                    LayeredIntentClassifier::new(Arc::new(clf)).with_rule_only_labels(rule_only),
                ),
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "intent dataset unusable; using rules");
                    Arc::new(RuleIntentClassifier)
                }
            }
        } else {
            Arc::new(RuleIntentClassifier)
        };

        Self {
            embedder,
            classifier,
            extractor: Arc::new(RuleEntityExtractor::new()),
        }
    }

    pub fn rules_only() -> Self {
        Self {
            embedder: Arc::new(HashEmbeddingModel::new(EMBEDDING_DIMS)),
            classifier: Arc::new(RuleIntentClassifier),
            extractor: Arc::new(RuleEntityExtractor::new()),
        }
    }
}
