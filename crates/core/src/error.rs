use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{MissingField, ResponseStatus, TransactionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adapter {
    IntentClassifier,
    EntityExtractor,
    RetrievalGateway,
}

impl Adapter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IntentClassifier => "intent_classifier",
            Self::EntityExtractor => "entity_extractor",
            Self::RetrievalGateway => "retrieval_gateway",
        }
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a routed request can end short of its happy path. All of these
/// are returned to the caller; none of them aborts the process.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingError {
    #[error("transfer request is missing: {}", describe_missing(.missing))]
    MissingEntity {
        missing: Vec<MissingField>,
        recipient: Option<String>,
        balance: Option<Decimal>,
    },

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        balance: Decimal,
        requested: Decimal,
        transaction: TransactionRecord,
    },

    #[error("no retrieved chunk reached the similarity threshold {threshold}")]
    LowConfidenceRetrieval {
        best_score: Option<f32>,
        threshold: f32,
    },

    #[error("{adapter} did not answer within {timeout_ms}ms")]
    AdapterTimeout { adapter: Adapter, timeout_ms: u64 },

    #[error("{adapter} failed: {reason}")]
    AdapterFailure { adapter: Adapter, reason: String },

    #[error("concurrent update conflict on account {account_id}")]
    ConcurrencyConflict { account_id: String },

    #[error("account {account_id} is frozen")]
    AccountFrozen {
        account_id: String,
        transaction: TransactionRecord,
    },

    #[error("account {account_id} not found")]
    AccountNotFound { account_id: String },

    #[error("invalid transfer amount {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("storage unavailable: {reason}")]
    Storage { reason: String },
}

impl RoutingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingEntity { .. } => "missing_entity",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::LowConfidenceRetrieval { .. } => "low_confidence_retrieval",
            Self::AdapterTimeout { .. } => "adapter_timeout",
            Self::AdapterFailure { .. } => "adapter_failure",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::AccountFrozen { .. } => "account_frozen",
            Self::AccountNotFound { .. } => "account_not_found",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::Storage { .. } => "storage",
        }
    }

    pub fn status(&self) -> ResponseStatus {
        match self {
            Self::LowConfidenceRetrieval { .. } => ResponseStatus::Ok,
            Self::MissingEntity { .. }
            | Self::InsufficientFunds { .. }
            | Self::AccountFrozen { .. }
            | Self::InvalidAmount { .. } => ResponseStatus::Rejected,
            Self::AdapterTimeout { .. }
            | Self::AdapterFailure { .. }
            | Self::ConcurrencyConflict { .. }
            | Self::AccountNotFound { .. }
            | Self::Storage { .. } => ResponseStatus::Error,
        }
    }

    /// Upstream collaborator was slow or unreachable; the ledger was not touched.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Self::AdapterTimeout { .. } | Self::AdapterFailure { .. }
        )
    }

    /// Safe for the caller to resend the whole request unchanged.
    pub fn is_retryable(&self) -> bool {
        self.is_service_unavailable() || matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Rejected history record written by the ledger for this failure, if any.
    pub fn transaction(&self) -> Option<&TransactionRecord> {
        match self {
            Self::InsufficientFunds { transaction, .. } | Self::AccountFrozen { transaction, .. } => {
                Some(transaction)
            }
            _ => None,
        }
    }
}

fn describe_missing(missing: &[MissingField]) -> String {
    missing
        .iter()
        .map(|field| match field {
            MissingField::Recipient => "recipient",
            MissingField::Amount => "amount",
        })
        .collect::<Vec<_>>()
        .join(", ")
}
