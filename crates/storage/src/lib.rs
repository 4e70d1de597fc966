mod memory;
mod sqlite;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use teller_core::{
    Account, RejectionReason, RoutingError, TransactionRecord, TransactionStatus,
};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(String),

    #[error("invalid amount {0}")]
    InvalidAmount(Decimal),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        balance: Decimal,
        requested: Decimal,
        record: TransactionRecord,
    },

    #[error("account {} is frozen", .record.account_id)]
    AccountFrozen { record: TransactionRecord },

    #[error("concurrent update conflict on account {account_id}")]
    ConcurrencyConflict { account_id: String },

    /// The database refused the write because another writer holds the lock.
    #[error("database busy: {0}")]
    Busy(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Rejected record appended before this error was returned, if any.
    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            Self::InsufficientFunds { record, .. } | Self::AccountFrozen { record } => Some(record),
            _ => None,
        }
    }

    /// Attributes a lock refusal to the account whose operation hit it.
    pub(crate) fn on_account(self, account_id: &str) -> Self {
        match self {
            Self::Busy(_) => Self::ConcurrencyConflict {
                account_id: account_id.to_string(),
            },
            other => other,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            // SQLITE_BUSY / SQLITE_LOCKED, including their extended codes.
            let primary = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            if matches!(primary, Some(5) | Some(6)) {
                return Self::Busy(db.message().to_string());
            }
        }
        Self::Storage(err.to_string())
    }
}

impl From<LedgerError> for RoutingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(account_id) => Self::AccountNotFound { account_id },
            LedgerError::InvalidAmount(amount) => Self::InvalidAmount { amount },
            LedgerError::InsufficientFunds {
                balance,
                requested,
                record,
            } => Self::InsufficientFunds {
                balance,
                requested,
                transaction: record,
            },
            LedgerError::AccountFrozen { record } => Self::AccountFrozen {
                account_id: record.account_id.clone(),
                transaction: record,
            },
            LedgerError::ConcurrencyConflict { account_id } => {
                Self::ConcurrencyConflict { account_id }
            }
            LedgerError::Busy(reason) => Self::Storage {
                reason: format!("database busy: {reason}"),
            },
            LedgerError::Storage(reason) => Self::Storage { reason },
        }
    }
}

/// Account balances plus the append-only transaction history.
///
/// `transfer` is the only operation that moves money. Its balance check and
/// decrement are indivisible per account, and every attempt that passes
/// validation leaves exactly one history record behind, committed or not.
pub trait LedgerRepository: Send + Sync {
    /// Creates the account if it does not exist; an existing account is
    /// returned untouched.
    async fn open_account(
        &self,
        account_id: &str,
        opening_balance: Decimal,
    ) -> std::result::Result<Account, LedgerError>;

    async fn account(&self, account_id: &str) -> std::result::Result<Option<Account>, LedgerError>;

    async fn freeze(&self, account_id: &str) -> std::result::Result<Account, LedgerError>;

    async fn transfer(
        &self,
        account_id: &str,
        counterparty: &str,
        amount: Decimal,
    ) -> std::result::Result<TransactionRecord, LedgerError>;

    async fn history(
        &self,
        account_id: &str,
    ) -> std::result::Result<Vec<TransactionRecord>, LedgerError>;
}

pub(crate) struct RecordDraft<'a> {
    pub account_id: &'a str,
    pub sequence: u64,
    pub counterparty: &'a str,
    pub amount: Decimal,
    pub balance_after: Decimal,
}

impl RecordDraft<'_> {
    pub fn committed(self) -> TransactionRecord {
        self.finish(TransactionStatus::Committed, None)
    }

    pub fn rejected(self, reason: RejectionReason) -> TransactionRecord {
        self.finish(TransactionStatus::Rejected, Some(reason))
    }

    fn finish(self, status: TransactionStatus, reason: Option<RejectionReason>) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4().to_string(),
            account_id: self.account_id.to_string(),
            sequence: self.sequence,
            counterparty: self.counterparty.to_string(),
            amount: self.amount,
            balance_after: self.balance_after,
            timestamp: Utc::now(),
            status,
            reason,
        }
    }
}

pub(crate) fn rejection_error(record: TransactionRecord, balance: Decimal) -> LedgerError {
    match record.reason {
        Some(RejectionReason::AccountFrozen) => LedgerError::AccountFrozen { record },
        _ => LedgerError::InsufficientFunds {
            balance,
            requested: record.amount,
            record,
        },
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    /// SQLite when a database url is configured, otherwise in-memory.
    pub async fn from_database_url(database_url: Option<&str>) -> Result<Self> {
        match database_url {
            Some(url) if !url.trim().is_empty() => Self::sqlite(url).await,
            _ => Ok(Self::memory()),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl LedgerRepository for Store {
    async fn open_account(
        &self,
        account_id: &str,
        opening_balance: Decimal,
    ) -> std::result::Result<Account, LedgerError> {
        match self {
            Store::Memory(store) => store.open_account(account_id, opening_balance).await,
            Store::Sqlite(store) => store.open_account(account_id, opening_balance).await,
        }
    }

    async fn account(&self, account_id: &str) -> std::result::Result<Option<Account>, LedgerError> {
        match self {
            Store::Memory(store) => store.account(account_id).await,
            Store::Sqlite(store) => store.account(account_id).await,
        }
    }

    async fn freeze(&self, account_id: &str) -> std::result::Result<Account, LedgerError> {
        match self {
            Store::Memory(store) => store.freeze(account_id).await,
            Store::Sqlite(store) => store.freeze(account_id).await,
        }
    }

    async fn transfer(
        &self,
        account_id: &str,
        counterparty: &str,
        amount: Decimal,
    ) -> std::result::Result<TransactionRecord, LedgerError> {
        match self {
            Store::Memory(store) => store.transfer(account_id, counterparty, amount).await,
            Store::Sqlite(store) => store.transfer(account_id, counterparty, amount).await,
        }
    }

    async fn history(
        &self,
        account_id: &str,
    ) -> std::result::Result<Vec<TransactionRecord>, LedgerError> {
        match self {
            Store::Memory(store) => store.history(account_id).await,
            Store::Sqlite(store) => store.history(account_id).await,
        }
    }
}
