use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::intent::IntentLabel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPrediction {
    pub label: IntentLabel,
    pub confidence: f32,
}

impl IntentPrediction {
    pub fn new(label: impl Into<IntentLabel>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_label(&self, label: IntentLabel) -> Self {
        Self {
            label,
            confidence: self.confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    Amount,
    Date,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NormalizedValue {
    Amount(Decimal),
    Date(NaiveDate),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub kind: EntityKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<NormalizedValue>,
}

impl EntityMention {
    pub fn new(kind: EntityKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            normalized: None,
        }
    }

    pub fn person(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Person, name)
    }

    pub fn amount(raw: impl Into<String>, parsed: Option<Decimal>) -> Self {
        Self {
            kind: EntityKind::Amount,
            value: raw.into(),
            normalized: parsed.map(NormalizedValue::Amount),
        }
    }

    pub fn date(raw: impl Into<String>, parsed: Option<NaiveDate>) -> Self {
        Self {
            kind: EntityKind::Date,
            value: raw.into(),
            normalized: parsed.map(NormalizedValue::Date),
        }
    }

    /// Typed amount if the extractor supplied one, otherwise parsed from the
    /// raw span.
    pub fn amount_value(&self) -> Option<Decimal> {
        if self.kind != EntityKind::Amount {
            return None;
        }
        match &self.normalized {
            Some(NormalizedValue::Amount(value)) if *value > Decimal::ZERO => Some(*value),
            Some(NormalizedValue::Amount(_)) => None,
            _ => crate::money::parse_amount(&self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    SafetyAction,
    TransferAction,
    InformationalQuery,
}

impl ActionClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SafetyAction => "safety_action",
            Self::TransferAction => "transfer_action",
            Self::InformationalQuery => "informational_query",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub balance: Decimal,
    pub frozen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Committed,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "COMMITTED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "COMMITTED" => Some(Self::Committed),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientFunds,
    AccountFrozen,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientFunds => "insufficient_funds",
            Self::AccountFrozen => "account_frozen",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "insufficient_funds" => Some(Self::InsufficientFunds),
            "account_frozen" => Some(Self::AccountFrozen),
            _ => None,
        }
    }
}

/// One line of an account's append-only history. `sequence` is the per-account
/// commit order; `balance_after` is the balance observed once this record was
/// written (unchanged for rejected attempts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub account_id: String,
    pub sequence: u64,
    pub counterparty: String,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    pub id: String,
    pub title: String,
    pub source_path: String,
    pub tags: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub doc_id: String,
    pub title: String,
    pub chunk: String,
    pub score: f32,
    pub source_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    Recipient,
    Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Frozen { account_id: String },
    Committed { transaction: TransactionRecord },
    Answered { chunk: RetrievedChunk },
    Declined { error: RoutingError },
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Frozen { .. } => "frozen",
            Self::Committed { .. } => "committed",
            Self::Answered { .. } => "answered",
            Self::Declined { error } => error.kind(),
        }
    }
}

/// Full trace of one routed request. Intent fields stay empty when the
/// request failed before the classifier answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDecision {
    pub account_id: String,
    pub action_class: Option<ActionClass>,
    pub raw_intent: Option<IntentPrediction>,
    pub resolved_intent: Option<IntentPrediction>,
    pub corrected: bool,
    pub entities: Vec<EntityMention>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideEffects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    pub message: String,
    pub side_effects: SideEffects,
    pub decision: RouterDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub account_id: Option<String>,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_prefers_normalized_value() {
        let mention = EntityMention::amount("a hundred bucks", Some(dec!(100)));
        assert_eq!(mention.amount_value(), Some(dec!(100)));
    }

    #[test]
    fn amount_falls_back_to_raw_span() {
        let mention = EntityMention::amount("$250", None);
        assert_eq!(mention.amount_value(), Some(dec!(250)));

        let person = EntityMention::person("250");
        assert_eq!(person.amount_value(), None);
    }

    #[test]
    fn entity_kind_uses_upper_case_wire_names() {
        let json = serde_json::to_value(EntityMention::person("John")).unwrap();
        assert_eq!(json["kind"], "PERSON");
        assert!(json.get("normalized").is_none());
    }
}
