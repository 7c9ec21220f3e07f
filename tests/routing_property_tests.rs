//! Property-based tests for rule matching, level selection and approver
//! resolution.
//!
//! Rules are generated as flattened rows, the same shape the rule source
//! delivers, so every property also exercises the row builder.

use approval_routing::{
    builder::{RuleRow, build_rules, sort_rule_rows},
    condition::evaluate_rule,
    context::TransactionContext,
    matcher::{approvers_for_level, find_matching_level, find_matching_rule},
    rule::ApprovalType,
    types::FieldValue,
};
use proptest::prelude::*;
use std::collections::HashSet;

/// A rule with an optional `class` EqualTo condition.
fn rule_strategy() -> impl Strategy<Value = (Option<i64>, Option<String>, bool)> {
    (
        prop::option::of(0i64..5),
        prop::option::of(prop_oneof![Just("A".to_string()), Just("B".to_string())]),
        any::<bool>(),
    )
}

fn rules_rows(specs: &[(Option<i64>, Option<String>, bool)]) -> Vec<RuleRow> {
    let mut rows: Vec<RuleRow> = specs
        .iter()
        .enumerate()
        .map(|(i, (priority, class, is_default))| {
            let mut row = RuleRow::rule(i as u64 + 1, &format!("rule_{i}"));
            if let Some(priority) = priority {
                row = row.set_priority(*priority);
            }
            if let Some(class) = class {
                row = row.set_condition(i as u64 + 1, "class", "equalto", class);
            }
            if *is_default {
                row = row.set_default();
            }
            row
        })
        .collect();
    sort_rule_rows(&mut rows);
    rows
}

/// Assignee rows for a single level: (approver, sequence) pairs, duplicates
/// allowed.
fn assignee_strategy() -> impl Strategy<Value = Vec<(u8, i64)>> {
    prop::collection::vec((0u8..6, 0i64..4), 0..12)
}

proptest! {
    /// Property: a rule without conditions matches any context
    #[test]
    fn prop_unconditional_rule_always_matches(class in "[A-Z]{0,3}", total in any::<f64>()) {
        let rules = build_rules(&[RuleRow::rule(1, "catch all")]);
        let ctx: TransactionContext = [
            ("class", FieldValue::Text(class)),
            ("total", FieldValue::Number(total)),
        ]
        .into_iter()
        .collect();

        prop_assert!(evaluate_rule(&rules[0], &ctx));
    }

    /// Property: the matcher returns the first matching rule in priority
    /// order, or the first default when nothing matches
    #[test]
    fn prop_matcher_returns_first_match(
        specs in prop::collection::vec(rule_strategy(), 1..8),
        class in prop_oneof![Just("A"), Just("B"), Just("C")],
    ) {
        let rules = build_rules(&rules_rows(&specs));
        let ctx: TransactionContext = [("class", class)].into_iter().collect();

        let expected = rules
            .iter()
            .find(|rule| rule.conditions.iter().all(|c| c.value == class))
            .or_else(|| rules.iter().find(|rule| rule.is_default))
            .map(|rule| rule.id);

        prop_assert_eq!(find_matching_rule(&rules, &ctx).map(|rule| rule.id), expected);
    }

    /// Property: rules with equal priority keep their relative (rule id) order
    #[test]
    fn prop_priority_ties_keep_input_order(count in 2usize..6, priority in 0i64..3) {
        let specs: Vec<_> = (0..count).map(|_| (Some(priority), None, false)).collect();
        let rules = build_rules(&rules_rows(&specs));
        let ctx = TransactionContext::default();

        prop_assert_eq!(find_matching_rule(&rules, &ctx).map(|rule| rule.id), Some(1));
    }

    /// Property: level bounds are inclusive on both ends
    #[test]
    fn prop_level_bounds_inclusive(min in 0u32..10_000, width in 0u32..10_000) {
        let min = min as f64;
        let max = min + width as f64;
        let rules = build_rules(&[RuleRow::rule(1, "r")
            .set_level(1, Some(min), Some(max), 1, ApprovalType::Any)]);

        prop_assert!(find_matching_level(&rules[0], min).is_some());
        prop_assert!(find_matching_level(&rules[0], max).is_some());
        prop_assert!(find_matching_level(&rules[0], min - 0.5).is_none());
        prop_assert!(find_matching_level(&rules[0], max + 0.5).is_none());
    }

    /// Property: resolved approvers are sorted by sequence and unique by
    /// approver id
    #[test]
    fn prop_approvers_sorted_and_unique(assignees in assignee_strategy()) {
        let mut rows: Vec<RuleRow> = assignees
            .iter()
            .enumerate()
            .map(|(i, (user, sequence))| {
                RuleRow::rule(1, "r")
                    .set_level(1, None, None, 1, ApprovalType::Any)
                    .set_assignee(i as u64, &format!("user_{user}"), *sequence)
            })
            .collect();
        if rows.is_empty() {
            rows.push(RuleRow::rule(1, "r").set_level(1, None, None, 1, ApprovalType::Any));
        }
        sort_rule_rows(&mut rows);
        let rules = build_rules(&rows);

        let approvers = approvers_for_level(&rules[0].levels[0]);

        prop_assert!(approvers.windows(2).all(|w| w[0].sequence <= w[1].sequence));
        let unique: HashSet<&str> = approvers.iter().map(|a| a.approver_id.as_str()).collect();
        prop_assert_eq!(unique.len(), approvers.len());
        let distinct_users: HashSet<u8> = assignees.iter().map(|(user, _)| *user).collect();
        prop_assert_eq!(approvers.len(), distinct_users.len());
    }
}

#[test]
fn any_of_list_membership() {
    let rules = build_rules(&[RuleRow::rule(1, "r").set_condition(1, "class", "anyof", "1,2,3")]);

    let two: TransactionContext = [("class", 2.0)].into_iter().collect();
    let four: TransactionContext = [("class", 4.0)].into_iter().collect();

    assert!(evaluate_rule(&rules[0], &two));
    assert!(!evaluate_rule(&rules[0], &four));
}
