use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use teller_core::money::{from_minor_units, to_minor_units};
use teller_core::{Account, RejectionReason, TransactionRecord};

use crate::{rejection_error, LedgerError, LedgerRepository, RecordDraft};

struct AccountBook {
    balance_cents: i64,
    frozen: bool,
    next_sequence: u64,
    history: Vec<TransactionRecord>,
}

impl AccountBook {
    fn snapshot(&self, account_id: &str) -> Account {
        Account {
            id: account_id.to_string(),
            balance: from_minor_units(self.balance_cents),
            frozen: self.frozen,
        }
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

/// In-process ledger. The outer map lock is only held long enough to find an
/// account; each account then has its own mutex, so transfers on different
/// accounts never wait on each other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    books: Arc<RwLock<HashMap<String, Arc<Mutex<AccountBook>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, account_id: &str) -> Result<Arc<Mutex<AccountBook>>, LedgerError> {
        self.books
            .read()
            .get(account_id)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }
}

impl LedgerRepository for MemoryStore {
    async fn open_account(
        &self,
        account_id: &str,
        opening_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        let balance_cents = to_minor_units(opening_balance)
            .filter(|cents| *cents >= 0)
            .ok_or(LedgerError::InvalidAmount(opening_balance))?;

        let book = self
            .books
            .write()
            .entry(account_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(AccountBook {
                    balance_cents,
                    frozen: false,
                    next_sequence: 1,
                    history: Vec::new(),
                }))
            })
            .clone();

        let account = book.lock().snapshot(account_id);
        Ok(account)
    }

    async fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        let book = self.books.read().get(account_id).cloned();
        Ok(book.map(|book| book.lock().snapshot(account_id)))
    }

    async fn freeze(&self, account_id: &str) -> Result<Account, LedgerError> {
        let book = self.book(account_id)?;
        let mut book = book.lock();
        book.frozen = true;
        Ok(book.snapshot(account_id))
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

        let book = self.book(account_id)?;
        let mut book = book.lock();

        let rejection = if book.frozen {
            Some(RejectionReason::AccountFrozen)
        } else if book.balance_cents < amount_cents {
            Some(RejectionReason::InsufficientFunds)
        } else {
            None
        };

        if rejection.is_none() {
            book.balance_cents -= amount_cents;
        }

        let draft = RecordDraft {
            account_id,
            sequence: book.take_sequence(),
            counterparty,
            amount: from_minor_units(amount_cents),
            balance_after: from_minor_units(book.balance_cents),
        };

        match rejection {
            Some(reason) => {
                tracing::warn!(account_id, reason = reason.as_str(), "transfer rejected");
                let record = draft.rejected(reason);
                book.history.push(record.clone());
                Err(rejection_error(record, from_minor_units(book.balance_cents)))
            }
            None => {
                let record = draft.committed();
                book.history.push(record.clone());
                Ok(record)
            }
        }
    }

    async fn history(&self, account_id: &str) -> Result<Vec<TransactionRecord>, LedgerError> {
        let book = self.book(account_id)?;
        let history = book.lock().history.clone();
        Ok(history)
    }
}
