/// Problems with authored rule configuration. Recovered locally: the affected
/// rule or condition degrades to a non-match and routing carries on.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Approval rule {0} not found")]
    RuleNotFound(u64),
    #[error("Approval level {level_id} not found on rule {rule_id}")]
    LevelNotFound { rule_id: u64, level_id: u64 },
    #[error("Condition {condition_id} uses unsupported operator '{operator}'")]
    UnknownOperator { condition_id: u64, operator: String },
    #[error("Condition {condition_id} compares against non-numeric value '{value}'")]
    UnparseableNumber { condition_id: u64, value: String },
    #[error("Approval rule {rule_id} has no levels")]
    NoLevels { rule_id: u64 },
    #[error("Unknown approval type code {0}")]
    UnknownApprovalType(u32),
    #[error("Neither rule {rule_id} nor its level declares an approval type")]
    MissingApprovalType { rule_id: u64 },
}

/// A rule referenced a field the record type does not have.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldAccessError {
    #[error("Field '{field_id}' is not available on {transaction_type} records")]
    NotApplicable {
        field_id: String,
        transaction_type: String,
    },
}

/// Record store failures. Always propagated to the caller.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Transaction {transaction_type}/{transaction_id} not found")]
    NotFound {
        transaction_type: String,
        transaction_id: String,
    },
    #[error("Transaction {transaction_id} was modified concurrently (expected version {expected})")]
    Conflict {
        transaction_id: String,
        expected: u64,
    },
    #[error("Store lock poisoned")]
    Poisoned,
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for PersistenceError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        PersistenceError::Encode(value.to_string())
    }
}

/// Why an approve/reject action was refused or failed.
#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Transaction is not pending approval (status: {status})")]
    NotPending { status: String },
    #[error("Transaction has no approval routing")]
    Unrouted,
    #[error("Transaction is already routed to rule {rule_id}")]
    AlreadyRouted { rule_id: u64 },
    #[error("Transaction is rejected or its lines are closed, no further actions are possible")]
    Closed,
    #[error("Out of sequence approval. Expected: {expected}, Got: {actor}")]
    OutOfSequence { expected: String, actor: String },
    #[error("User {actor} has already acted on this transaction")]
    RepeatAction { actor: String },
    #[error("Unknown approval action '{0}'")]
    UnknownAction(String),
}
