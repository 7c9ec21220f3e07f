//! sled-backed record store and rule source
//!
//! Transactions are stored as CBOR under `txn/{type}/{id}`; rule rows as a
//! CBOR list under `rules/{type}`. Commits use sled's compare-and-swap so a
//! writer holding a stale copy of a transaction can never overwrite a newer
//! one.
use super::builder::{RuleRow, sort_rule_rows};
use super::context::Transaction;
use super::error::PersistenceError;
use super::store::{RecordStore, RuleSource};
use std::sync::Arc;
use tracing::debug;

pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    fn transaction_key(transaction_type: &str, transaction_id: &str) -> String {
        format!("txn/{transaction_type}/{transaction_id}")
    }

    fn rules_key(transaction_type: &str) -> String {
        format!("rules/{transaction_type}")
    }

    /// Replaces the rule rows published for `transaction_type`.
    pub fn store_rule_rows(
        &self,
        transaction_type: &str,
        rows: &[RuleRow],
    ) -> Result<(), PersistenceError> {
        let cbor = minicbor::to_vec(rows)?;
        self.instance
            .insert(Self::rules_key(transaction_type).as_bytes(), cbor)?;
        self.instance.flush()?;
        Ok(())
    }
}

impl RecordStore for SledStore {
    fn load(
        &self,
        transaction_type: &str,
        transaction_id: &str,
    ) -> Result<Transaction, PersistenceError> {
        let key = Self::transaction_key(transaction_type, transaction_id);
        let Some(bytes) = self.instance.get(key.as_bytes())? else {
            return Err(PersistenceError::NotFound {
                transaction_type: transaction_type.to_string(),
                transaction_id: transaction_id.to_string(),
            });
        };
        Ok(minicbor::decode(&bytes)?)
    }

    fn commit(&self, transaction: &mut Transaction) -> Result<(), PersistenceError> {
        let key = Self::transaction_key(&transaction.transaction_type, &transaction.transaction_id);
        let conflict = || PersistenceError::Conflict {
            transaction_id: transaction.transaction_id.clone(),
            expected: transaction.version,
        };

        let current = self.instance.get(key.as_bytes())?;
        let stored_version = match &current {
            Some(bytes) => minicbor::decode::<Transaction>(bytes)?.version,
            None => 0,
        };
        if stored_version != transaction.version {
            return Err(conflict());
        }

        let mut next = transaction.clone();
        next.version += 1;
        let cbor = minicbor::to_vec(&next)?;

        if self
            .instance
            .compare_and_swap(key.as_bytes(), current, Some(cbor))?
            .is_err()
        {
            return Err(conflict());
        }
        self.instance.flush()?;

        debug!(key = %key, version = next.version, "committed transaction");
        *transaction = next;
        Ok(())
    }
}

impl RuleSource for SledStore {
    fn rule_rows(&self, transaction_type: &str) -> Result<Vec<RuleRow>, PersistenceError> {
        let Some(bytes) = self.instance.get(Self::rules_key(transaction_type).as_bytes())? else {
            return Ok(vec![]);
        };
        let mut rows: Vec<RuleRow> = minicbor::decode(&bytes)?;
        sort_rule_rows(&mut rows);
        Ok(rows)
    }
}
