//! Hierarchical approval rule model
use super::error::ConfigurationError;

/// How approvals at a level aggregate into a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalType {
    Any,
    All,
    Sequential,
}

impl ApprovalType {
    /// Maps the stored list code: 1 = Any, 2 = All, 3 = Sequential.
    pub fn from_code(code: u32) -> Result<Self, ConfigurationError> {
        match code {
            1 => Ok(ApprovalType::Any),
            2 => Ok(ApprovalType::All),
            3 => Ok(ApprovalType::Sequential),
            other => Err(ConfigurationError::UnknownApprovalType(other)),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ApprovalType::Any => 1,
            ApprovalType::All => 2,
            ApprovalType::Sequential => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    EqualTo,
    AnyOf,
    GreaterThan,
    LessThan,
    // kept verbatim so evaluation can report it
    Unknown(String),
}

impl Operator {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "equalto" | "is" => Operator::EqualTo,
            "anyof" => Operator::AnyOf,
            "greaterthan" => Operator::GreaterThan,
            "lessthan" => Operator::LessThan,
            _ => Operator::Unknown(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleCondition {
    pub id: u64,
    pub field_id: String,
    pub operator: Operator,
    pub value: String, // raw, parsed at evaluation time
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalAssignee {
    pub id: u64,
    pub approver_id: String,
    pub sequence: i64,
    pub is_required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalLevel {
    pub id: u64,
    pub min_amount: f64,
    pub max_amount: Option<f64>, // None is unbounded above
    pub min_approvals: u32,
    pub approval_type: Option<ApprovalType>,
    pub assignees: Vec<ApprovalAssignee>,
}

impl ApprovalLevel {
    /// Both bounds are inclusive.
    pub fn contains(&self, threshold: f64) -> bool {
        threshold >= self.min_amount && self.max_amount.is_none_or(|max| threshold <= max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRule {
    pub id: u64,
    pub name: String,
    pub approval_type: Option<ApprovalType>,
    pub priority: Option<i64>,
    pub is_default: bool,
    pub threshold_field: Option<String>,
    pub conditions: Vec<RuleCondition>,
    pub levels: Vec<ApprovalLevel>,
    pub required_fields: Vec<String>,
}

impl ApprovalRule {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            approval_type: None,
            priority: None,
            is_default: false,
            threshold_field: None,
            conditions: vec![],
            levels: vec![],
            required_fields: vec![],
        }
    }

    pub fn level(&self, level_id: u64) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|level| level.id == level_id)
    }

    /// The level's own type wins over the rule's.
    pub fn policy_for(&self, level: &ApprovalLevel) -> Option<ApprovalType> {
        level.approval_type.or(self.approval_type)
    }

    pub(crate) fn require_field(&mut self, field_id: &str) {
        if !self.required_fields.iter().any(|f| f == field_id) {
            self.required_fields.push(field_id.to_string());
        }
    }
}
