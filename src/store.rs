//! Storage contracts the engine runs against
use super::builder::RuleRow;
use super::context::Transaction;
use super::error::PersistenceError;

/// Loads and commits transaction records.
pub trait RecordStore: Send + Sync {
    fn load(
        &self,
        transaction_type: &str,
        transaction_id: &str,
    ) -> Result<Transaction, PersistenceError>;

    /// Persists every pending change on `transaction`.
    ///
    /// The commit only applies if the stored version still equals
    /// `transaction.version` (absent counts as 0); otherwise it fails with
    /// [`PersistenceError::Conflict`]. On success the version is bumped.
    fn commit(&self, transaction: &mut Transaction) -> Result<(), PersistenceError>;
}

/// Supplies flattened rule rows for a transaction type, ordered by priority
/// descending (nulls last), rule id, level min amount, assignee sequence.
pub trait RuleSource: Send + Sync {
    fn rule_rows(&self, transaction_type: &str) -> Result<Vec<RuleRow>, PersistenceError>;
}
