//! Transaction records and the field context rules are evaluated against
use super::error::{FieldAccessError, PersistenceError};
use super::progress::{ApprovalAction, HistoryEntry};
use super::rule::ApprovalRule;
use super::types::{FieldValue, LineItem};
use std::collections::BTreeMap;
use tracing::warn;

/// Read access to a record's fields by id.
pub trait FieldAccess {
    fn get_field(&self, field_id: &str) -> Result<FieldValue, FieldAccessError>;
}

/// A business transaction (e.g. a sales order) as held by the record store.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Transaction {
    #[n(0)]
    pub transaction_id: String,
    #[n(1)]
    pub transaction_type: String,
    #[n(2)]
    pub version: u64, // bumped on every commit, 0 until first stored
    #[n(3)]
    fields: BTreeMap<String, FieldValue>,
    #[n(4)]
    lines: Vec<LineItem>,
    #[n(5)]
    history: Vec<HistoryEntry>, // append only
}

impl Transaction {
    pub fn new(transaction_type: &str, transaction_id: &str) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            transaction_type: transaction_type.to_string(),
            version: 0,
            fields: BTreeMap::new(),
            lines: vec![],
            history: vec![],
        }
    }
    pub fn with_field(mut self, field_id: &str, value: impl Into<FieldValue>) -> Self {
        self.set_field(field_id, value);
        self
    }
    pub fn with_line(mut self, item: &str) -> Self {
        let line = self.lines.len() as u32 + 1;
        self.lines.push(LineItem::new(line, item));
        self
    }
    pub fn set_field(&mut self, field_id: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field_id.to_string(), value.into());
    }
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }
    /// Closes every line, returns how many were open.
    pub fn close_all_lines(&mut self) -> usize {
        let mut closed = 0;
        for line in self.lines.iter_mut().filter(|line| !line.closed) {
            line.closed = true;
            closed += 1;
        }
        closed
    }
    pub fn all_lines_closed(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|line| line.closed)
    }
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
    /// Appends `action` under its content address and returns that address.
    pub fn record_action(&mut self, action: ApprovalAction) -> Result<String, PersistenceError> {
        let (id, _) = action.build()?;
        self.history.push(HistoryEntry {
            id: id.clone(),
            action,
        });
        Ok(id)
    }
}

impl FieldAccess for Transaction {
    fn get_field(&self, field_id: &str) -> Result<FieldValue, FieldAccessError> {
        self.fields
            .get(field_id)
            .cloned()
            .ok_or_else(|| FieldAccessError::NotApplicable {
                field_id: field_id.to_string(),
                transaction_type: self.transaction_type.clone(),
            })
    }
}

/// Projection of the fields any candidate rule refers to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionContext {
    values: BTreeMap<String, FieldValue>,
}

impl TransactionContext {
    /// Missing fields read as `Null`.
    pub fn get(&self, field_id: &str) -> &FieldValue {
        const NULL: &FieldValue = &FieldValue::Null;
        self.values.get(field_id).unwrap_or(NULL)
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for TransactionContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Reads every field required by any of `rules` from the record. A field the
/// record cannot supply is recorded as `Null`; it never aborts the build.
pub fn build_context(record: &impl FieldAccess, rules: &[ApprovalRule]) -> TransactionContext {
    let mut values = BTreeMap::new();

    for field_id in rules.iter().flat_map(|rule| rule.required_fields.iter()) {
        if values.contains_key(field_id) {
            continue;
        }
        let value = record.get_field(field_id).unwrap_or_else(|err| {
            warn!(field_id = %field_id, %err, "field unavailable, using null");
            FieldValue::Null
        });
        values.insert(field_id.clone(), value);
    }

    TransactionContext { values }
}
