//! Builds the rule hierarchy from flattened rule rows
//!
//! The rule source returns one row per combination of rule, condition, level
//! and assignee (left-join shape), so conditions and levels repeat across
//! rows. Rows are folded into nested rules here.
use super::rule::{
    ApprovalAssignee, ApprovalLevel, ApprovalRule, ApprovalType, Operator, RuleCondition,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, error};

/// One flattened row. Everything except the rule columns may be null.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Default)]
pub struct RuleRow {
    #[n(0)]
    pub rule_id: u64,
    #[n(1)]
    pub rule_name: String,
    #[n(2)]
    pub rule_approval_type: Option<u32>,
    #[n(3)]
    pub rule_priority: Option<i64>,
    #[n(4)]
    pub is_default: bool,
    #[n(5)]
    pub threshold_field: Option<String>,

    #[n(6)]
    pub condition_id: Option<u64>,
    #[n(7)]
    pub condition_field_id: Option<String>,
    #[n(8)]
    pub condition_operator: Option<String>,
    #[n(9)]
    pub condition_value: Option<String>,

    #[n(10)]
    pub level_id: Option<u64>,
    #[n(11)]
    pub level_min_amount: Option<f64>,
    #[n(12)]
    pub level_max_amount: Option<f64>,
    #[n(13)]
    pub level_min_approvals: Option<u32>,
    #[n(14)]
    pub level_approval_type: Option<u32>,

    #[n(15)]
    pub assignee_id: Option<u64>,
    #[n(16)]
    pub approver_id: Option<String>,
    #[n(17)]
    pub approver_sequence: Option<i64>,
    #[n(18)]
    pub approver_is_required: Option<bool>,
}

impl RuleRow {
    /// Start a row for the given rule. Chain the setters to fill the rest.
    pub fn rule(rule_id: u64, rule_name: &str) -> Self {
        Self {
            rule_id,
            rule_name: rule_name.to_string(),
            ..Self::default()
        }
    }
    pub fn set_priority(mut self, priority: i64) -> Self {
        self.rule_priority = Some(priority);
        self
    }
    pub fn set_approval_type(mut self, approval_type: ApprovalType) -> Self {
        self.rule_approval_type = Some(approval_type.code());
        self
    }
    pub fn set_default(mut self) -> Self {
        self.is_default = true;
        self
    }
    pub fn set_threshold_field(mut self, field_id: &str) -> Self {
        self.threshold_field = Some(field_id.to_string());
        self
    }
    pub fn set_condition(mut self, id: u64, field_id: &str, operator: &str, value: &str) -> Self {
        self.condition_id = Some(id);
        self.condition_field_id = Some(field_id.to_string());
        self.condition_operator = Some(operator.to_string());
        self.condition_value = Some(value.to_string());
        self
    }
    pub fn set_level(
        mut self,
        id: u64,
        min_amount: Option<f64>,
        max_amount: Option<f64>,
        min_approvals: u32,
        approval_type: ApprovalType,
    ) -> Self {
        self.level_id = Some(id);
        self.level_min_amount = min_amount;
        self.level_max_amount = max_amount;
        self.level_min_approvals = Some(min_approvals);
        self.level_approval_type = Some(approval_type.code());
        self
    }
    pub fn set_assignee(mut self, id: u64, approver_id: &str, sequence: i64) -> Self {
        self.assignee_id = Some(id);
        self.approver_id = Some(approver_id.to_string());
        self.approver_sequence = Some(sequence);
        self.approver_is_required = Some(true);
        self
    }
}

/// Orders rows the way the rule source contract requires: priority
/// descending (nulls last), rule id, level min amount ascending, then
/// assignee sequence ascending. The sort is stable.
pub fn sort_rule_rows(rows: &mut [RuleRow]) {
    rows.sort_by(|a, b| {
        nulls_last(a.rule_priority, b.rule_priority, |x, y| y.cmp(x))
            .then(a.rule_id.cmp(&b.rule_id))
            .then(nulls_last(a.level_min_amount, b.level_min_amount, |x, y| {
                x.total_cmp(y)
            }))
            .then(nulls_last(
                a.approver_sequence,
                b.approver_sequence,
                |x, y| x.cmp(y),
            ))
    });
}

fn nulls_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(&a, &b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Folds ordered rows into rules, keeping the rows' relative order for rules,
/// levels and assignees. A later assignee row whose approver already sits on
/// the same level is dropped.
pub fn build_rules(rows: &[RuleRow]) -> Vec<ApprovalRule> {
    let mut rules: Vec<ApprovalRule> = Vec::new();
    let mut index: HashMap<u64, usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry(row.rule_id).or_insert_with(|| {
            rules.push(new_rule(row));
            rules.len() - 1
        });
        let rule = &mut rules[slot];

        if let Some(field_id) = &row.threshold_field {
            rule.require_field(field_id);
        }

        if let Some(condition_id) = row.condition_id
            && !rule.conditions.iter().any(|c| c.id == condition_id)
        {
            let field_id = row.condition_field_id.clone().unwrap_or_default();
            rule.require_field(&field_id);
            rule.conditions.push(RuleCondition {
                id: condition_id,
                field_id,
                operator: Operator::parse(row.condition_operator.as_deref().unwrap_or_default()),
                value: row.condition_value.clone().unwrap_or_default(),
            });
        }

        let Some(level_id) = row.level_id else {
            continue;
        };
        let level = match rule.levels.iter().position(|l| l.id == level_id) {
            Some(pos) => &mut rule.levels[pos],
            None => {
                rule.levels.push(new_level(row, level_id));
                let last = rule.levels.len() - 1;
                &mut rule.levels[last]
            }
        };

        let (Some(assignee_id), Some(approver_id)) = (row.assignee_id, &row.approver_id) else {
            continue;
        };
        if level.assignees.iter().any(|a| &a.approver_id == approver_id) {
            debug!(
                rule_id = row.rule_id,
                level_id,
                approver_id = %approver_id,
                "dropping duplicate approver"
            );
            continue;
        }
        level.assignees.push(ApprovalAssignee {
            id: assignee_id,
            approver_id: approver_id.clone(),
            sequence: row.approver_sequence.unwrap_or_default(),
            is_required: row.approver_is_required.unwrap_or_default(),
        });
    }

    rules
}

fn new_rule(row: &RuleRow) -> ApprovalRule {
    let mut rule = ApprovalRule::new(row.rule_id, row.rule_name.clone());
    rule.approval_type = approval_type(row.rule_approval_type, row.rule_id);
    rule.priority = row.rule_priority;
    rule.is_default = row.is_default;
    rule.threshold_field = row.threshold_field.clone();
    rule
}

fn new_level(row: &RuleRow, level_id: u64) -> ApprovalLevel {
    ApprovalLevel {
        id: level_id,
        min_amount: row.level_min_amount.unwrap_or(0.0),
        max_amount: row.level_max_amount,
        // an Any level without a count needs a single approval
        min_approvals: row.level_min_approvals.unwrap_or(1),
        approval_type: approval_type(row.level_approval_type, row.rule_id),
        assignees: vec![],
    }
}

fn approval_type(code: Option<u32>, rule_id: u64) -> Option<ApprovalType> {
    match ApprovalType::from_code(code?) {
        Ok(approval_type) => Some(approval_type),
        Err(err) => {
            error!(rule_id, %err, "ignoring approval type");
            None
        }
    }
}
