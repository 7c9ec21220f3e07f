//! In-memory record store and rule source with the same commit semantics as
//! the sled store.
use super::builder::{RuleRow, sort_rule_rows};
use super::context::Transaction;
use super::error::PersistenceError;
use super::store::{RecordStore, RuleSource};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    transactions: RwLock<HashMap<(String, String), Transaction>>,
    rules: RwLock<HashMap<String, Vec<RuleRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_rule_rows(
        &self,
        transaction_type: &str,
        rows: Vec<RuleRow>,
    ) -> Result<(), PersistenceError> {
        let mut rules = self.rules.write().map_err(|_| PersistenceError::Poisoned)?;
        rules.insert(transaction_type.to_string(), rows);
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn load(
        &self,
        transaction_type: &str,
        transaction_id: &str,
    ) -> Result<Transaction, PersistenceError> {
        let transactions = self
            .transactions
            .read()
            .map_err(|_| PersistenceError::Poisoned)?;
        transactions
            .get(&(transaction_type.to_string(), transaction_id.to_string()))
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound {
                transaction_type: transaction_type.to_string(),
                transaction_id: transaction_id.to_string(),
            })
    }

    fn commit(&self, transaction: &mut Transaction) -> Result<(), PersistenceError> {
        let mut transactions = self
            .transactions
            .write()
            .map_err(|_| PersistenceError::Poisoned)?;
        let key = (
            transaction.transaction_type.clone(),
            transaction.transaction_id.clone(),
        );
        let stored_version = transactions.get(&key).map_or(0, |t| t.version);
        if stored_version != transaction.version {
            return Err(PersistenceError::Conflict {
                transaction_id: transaction.transaction_id.clone(),
                expected: transaction.version,
            });
        }

        transaction.version += 1;
        transactions.insert(key, transaction.clone());
        Ok(())
    }
}

impl RuleSource for MemoryStore {
    fn rule_rows(&self, transaction_type: &str) -> Result<Vec<RuleRow>, PersistenceError> {
        let rules = self.rules.read().map_err(|_| PersistenceError::Poisoned)?;
        let mut rows = rules.get(transaction_type).cloned().unwrap_or_default();
        sort_rule_rows(&mut rows);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_advance_per_commit() {
        let store = MemoryStore::new();
        let mut txn = Transaction::new("salesord", "so-1");

        store.commit(&mut txn).unwrap();
        store.commit(&mut txn).unwrap();
        assert_eq!(txn.version, 2);

        let mut stale = txn.clone();
        stale.version = 1;
        assert!(matches!(
            store.commit(&mut stale),
            Err(PersistenceError::Conflict { expected: 1, .. })
        ));
    }
}
