use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use teller_core::money::{from_minor_units, to_minor_units};
use teller_core::{Account, RejectionReason, TransactionRecord, TransactionStatus};

use crate::{rejection_error, LedgerError, LedgerRepository, RecordDraft};

/// SQLite-backed ledger. Amounts are stored as integer cents. Transfers on one
/// account are serialized by an in-process async mutex, and the balance
/// decrement is additionally guarded in SQL so a second process sharing the
/// file cannot overdraw either.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    account_locks: Arc<parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each connection to an in-memory database is its own database.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self {
            pool,
            account_locks: Arc::default(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
              id TEXT PRIMARY KEY,
              balance_cents INTEGER NOT NULL CHECK(balance_cents >= 0),
              frozen INTEGER NOT NULL DEFAULT 0,
              next_sequence INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
              id TEXT PRIMARY KEY,
              account_id TEXT NOT NULL REFERENCES accounts(id),
              sequence INTEGER NOT NULL,
              counterparty TEXT NOT NULL,
              amount_cents INTEGER NOT NULL CHECK(amount_cents > 0),
              balance_after_cents INTEGER NOT NULL,
              timestamp TEXT NOT NULL,
              status TEXT NOT NULL CHECK(status IN ('COMMITTED','REJECTED')),
              reason TEXT,
              UNIQUE(account_id, sequence)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Per-account transfer lock. Entries are only created for accounts that
    /// exist; accounts are never deleted, so an entry never goes stale.
    async fn account_lock(
        &self,
        account_id: &str,
    ) -> Result<Arc<tokio::sync::Mutex<()>>, LedgerError> {
        let existing = self.account_locks.lock().get(account_id).cloned();
        if let Some(lock) = existing {
            return Ok(lock);
        }

        let known = sqlx::query("SELECT 1 FROM accounts WHERE id = ?1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if !known {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }

        Ok(self
            .account_locks
            .lock()
            .entry(account_id.to_string())
            .or_default()
            .clone())
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.account_locks.lock().len()
    }

    /// Debit plus history append in one SQLite transaction. The caller holds
    /// the account's transfer lock.
    async fn debit_serialized(
        &self,
        account_id: &str,
        counterparty: &str,
        amount_cents: i64,
    ) -> Result<TransactionRecord, LedgerError> {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before anything is read.
        let debited = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents - ?1, next_sequence = next_sequence + 1
            WHERE id = ?2 AND frozen = 0 AND balance_cents >= ?1
            RETURNING balance_cents, next_sequence - 1 AS sequence
            "#,
        )
        .bind(amount_cents)
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (record, balance_cents) = match debited {
            Some(row) => {
                let balance_cents: i64 = row.get("balance_cents");
                let record = RecordDraft {
                    account_id,
                    sequence: row.get::<i64, _>("sequence") as u64,
                    counterparty,
                    amount: from_minor_units(amount_cents),
                    balance_after: from_minor_units(balance_cents),
                }
                .committed();
                (record, balance_cents)
            }
            None => {
                let row = sqlx::query(
                    r#"
                    UPDATE accounts
                    SET next_sequence = next_sequence + 1
                    WHERE id = ?1
                    RETURNING balance_cents, frozen, next_sequence - 1 AS sequence
                    "#,
                )
                .bind(account_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

                let balance_cents: i64 = row.get("balance_cents");
                let reason = if row.get::<i64, _>("frozen") != 0 {
                    RejectionReason::AccountFrozen
                } else {
                    RejectionReason::InsufficientFunds
                };
                let record = RecordDraft {
                    account_id,
                    sequence: row.get::<i64, _>("sequence") as u64,
                    counterparty,
                    amount: from_minor_units(amount_cents),
                    balance_after: from_minor_units(balance_cents),
                }
                .rejected(reason);
                (record, balance_cents)
            }
        };

        sqlx::query(
            r#"
            INSERT INTO transactions
              (id, account_id, sequence, counterparty, amount_cents, balance_after_cents, timestamp, status, reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.account_id)
        .bind(record.sequence as i64)
        .bind(&record.counterparty)
        .bind(amount_cents)
        .bind(balance_cents)
        .bind(record.timestamp.to_rfc3339())
        .bind(record.status.as_str())
        .bind(record.reason.map(RejectionReason::as_str))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        match record.status {
            TransactionStatus::Committed => Ok(record),
            TransactionStatus::Rejected => {
                tracing::warn!(
                    account_id,
                    reason = record.reason.map(RejectionReason::as_str),
                    "transfer rejected"
                );
                Err(rejection_error(record, from_minor_units(balance_cents)))
            }
        }
    }
}

impl LedgerRepository for SqliteStore {
    async fn open_account(
        &self,
        account_id: &str,
        opening_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        let balance_cents = to_minor_units(opening_balance)
            .filter(|cents| *cents >= 0)
            .ok_or(LedgerError::InvalidAmount(opening_balance))?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, balance_cents)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(balance_cents)
        .execute(&self.pool)
        .await?;

        self.account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query("SELECT id, balance_cents, frozen FROM accounts WHERE id = ?1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            balance: from_minor_units(row.get("balance_cents")),
            frozen: row.get::<i64, _>("frozen") != 0,
        }))
    }

    async fn freeze(&self, account_id: &str) -> Result<Account, LedgerError> {
        let result = sqlx::query("UPDATE accounts SET frozen = 1 WHERE id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|err| LedgerError::from(err).on_account(account_id))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }

        self.account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn transfer(
        &self,
        account_id: &str,
        counterparty: &str,
        amount: Decimal,
    ) -> Result<TransactionRecord, LedgerError> {
        let amount_cents = to_minor_units(amount)
            .filter(|cents| *cents > 0)
            .ok_or(LedgerError::InvalidAmount(amount))?;

        let lock = self
            .account_lock(account_id)
            .await
            .map_err(|err| err.on_account(account_id))?;
        let _guard = lock.lock().await;

        self.debit_serialized(account_id, counterparty, amount_cents)
            .await
            .map_err(|err| err.on_account(account_id))
    }

    async fn history(&self, account_id: &str) -> Result<Vec<TransactionRecord>, LedgerError> {
        if self.account(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, account_id, sequence, counterparty, amount_cents, balance_after_cents,
                   timestamp, status, reason
            FROM transactions
            WHERE account_id = ?1
            ORDER BY sequence
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TransactionRecord, LedgerError> {
    let status_raw: String = row.get("status");
    let status = TransactionStatus::parse(&status_raw)
        .ok_or_else(|| LedgerError::Storage(format!("unknown transaction status {status_raw}")))?;

    let timestamp_raw: String = row.get("timestamp");
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_raw)
        .map_err(|err| LedgerError::Storage(format!("bad timestamp {timestamp_raw}: {err}")))?
        .with_timezone(&Utc);

    let reason = row
        .get::<Option<String>, _>("reason")
        .as_deref()
        .and_then(RejectionReason::parse);

    Ok(TransactionRecord {
        id: row.get("id"),
        account_id: row.get("account_id"),
        sequence: row.get::<i64, _>("sequence") as u64,
        counterparty: row.get("counterparty"),
        amount: from_minor_units(row.get("amount_cents")),
        balance_after: from_minor_units(row.get("balance_after_cents")),
        timestamp,
        status,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.open_account("primary", dec!(5000.00)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn persists_committed_and_rejected_records_in_order() {
        let store = seeded().await;

        let committed = store.transfer("primary", "John", dec!(100.00)).await.unwrap();
        assert_eq!(committed.balance_after, dec!(4900.00));

        let err = store
            .transfer("primary", "Sarah", dec!(10000.00))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { balance, .. } if balance == dec!(4900)));

        let history = store.history("primary").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], committed);
        assert_eq!(history[1].status, TransactionStatus::Rejected);
        assert_eq!(history[1].reason, Some(RejectionReason::InsufficientFunds));
        assert_eq!(history[1].sequence, 2);

        let account = store.account("primary").await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(4900.00));
    }

    #[tokio::test]
    async fn frozen_flag_survives_and_blocks_transfers() {
        let store = seeded().await;
        assert!(store.freeze("primary").await.unwrap().frozen);

        let err = store.transfer("primary", "John", dec!(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountFrozen { .. }));
        assert_eq!(
            store.account("primary").await.unwrap().unwrap().balance,
            dec!(5000)
        );
    }

    #[tokio::test]
    async fn missing_account_is_not_created_by_transfer() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let err = store.transfer("ghost", "John", dec!(1)).await.unwrap_err();
        assert_eq!(err, LedgerError::AccountNotFound("ghost".to_string()));
        assert!(store.freeze("ghost").await.is_err());
    }

    #[tokio::test]
    async fn unknown_accounts_do_not_grow_the_lock_table() {
        let store = seeded().await;
        for idx in 0..50 {
            let ghost = format!("ghost-{idx}");
            assert!(store.transfer(&ghost, "John", dec!(1)).await.is_err());
        }
        assert_eq!(store.tracked_locks(), 0);

        store.transfer("primary", "John", dec!(1)).await.unwrap();
        store.transfer("primary", "John", dec!(1)).await.unwrap();
        assert_eq!(store.tracked_locks(), 1);
    }
}
