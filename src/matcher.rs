//! Rule matching, level selection and approver resolution
use super::condition::evaluate_rule;
use super::context::{FieldAccess, TransactionContext, build_context};
use super::rule::{ApprovalAssignee, ApprovalLevel, ApprovalRule};
use tracing::{debug, warn};

/// First rule whose conditions match, scanning in list order (highest
/// priority first). Falls back to the first rule flagged default.
pub fn find_matching_rule<'a>(
    rules: &'a [ApprovalRule],
    context: &TransactionContext,
) -> Option<&'a ApprovalRule> {
    rules
        .iter()
        .find(|rule| evaluate_rule(rule, context))
        .or_else(|| rules.iter().find(|rule| rule.is_default))
}

/// First level, in stored order, whose inclusive range holds `threshold`.
///
/// Overlapping ranges are resolved by order alone: with `[0, 1000]` stored
/// before `[1000, ∞)`, a threshold of exactly 1000 selects the first.
pub fn find_matching_level(rule: &ApprovalRule, threshold: f64) -> Option<&ApprovalLevel> {
    rule.levels.iter().find(|level| level.contains(threshold))
}

/// Level assignees ordered by sequence. Ties keep their stored order.
pub fn approvers_for_level(level: &ApprovalLevel) -> Vec<ApprovalAssignee> {
    let mut approvers = level.assignees.clone();
    approvers.sort_by_key(|assignee| assignee.sequence);
    approvers
}

/// The value of the rule's threshold field on the record. Zero when the rule
/// has no threshold field or the value is unreadable or non-numeric.
pub fn threshold_value(rule: &ApprovalRule, record: &impl FieldAccess) -> f64 {
    let Some(field_id) = &rule.threshold_field else {
        return 0.0;
    };
    match record.get_field(field_id) {
        Ok(value) => value.as_number().unwrap_or_else(|| {
            if !value.is_null() {
                warn!(
                    rule_id = rule.id,
                    field_id = %field_id,
                    ?value,
                    "threshold is not numeric, using 0"
                );
            }
            0.0
        }),
        Err(err) => {
            warn!(rule_id = rule.id, %err, "threshold unavailable, using 0");
            0.0
        }
    }
}

/// Result of routing a transaction through the rule set.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingOutcome {
    /// No rule matched and no default exists.
    NoRule,
    /// A rule matched but none of its levels covers the threshold.
    NoLevel { rule_id: u64, threshold: f64 },
    Routed(Routing),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Routing {
    pub rule_id: u64,
    pub level_id: u64,
    pub threshold: f64,
    pub approvers: Vec<ApprovalAssignee>,
}

impl RoutingOutcome {
    pub fn routing(&self) -> Option<&Routing> {
        match self {
            RoutingOutcome::Routed(routing) => Some(routing),
            _ => None,
        }
    }
}

/// Runs the full resolution pipeline for one record: context, rule, threshold,
/// level, approvers.
pub fn resolve(rules: &[ApprovalRule], record: &impl FieldAccess) -> RoutingOutcome {
    let context = build_context(record, rules);
    debug!(fields = context.len(), "built transaction context");

    let Some(rule) = find_matching_rule(rules, &context) else {
        debug!(candidates = rules.len(), "no approval rule matched");
        return RoutingOutcome::NoRule;
    };

    let threshold = threshold_value(rule, record);
    let Some(level) = find_matching_level(rule, threshold) else {
        debug!(rule_id = rule.id, threshold, "no approval level covers threshold");
        return RoutingOutcome::NoLevel {
            rule_id: rule.id,
            threshold,
        };
    };

    debug!(rule_id = rule.id, level_id = level.id, threshold, "selected approval level");
    RoutingOutcome::Routed(Routing {
        rule_id: rule.id,
        level_id: level.id,
        threshold,
        approvers: approvers_for_level(level),
    })
}
