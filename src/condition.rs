//! Condition evaluation
use super::context::TransactionContext;
use super::error::ConfigurationError;
use super::rule::{ApprovalRule, Operator, RuleCondition};
use super::types::{FieldValue, parse_number};
use tracing::error;

/// Tests one condition against the record's value for its field.
///
/// An `Err` is a configuration problem with the condition itself (unknown
/// operator, non-numeric comparison value); callers treat it as a non-match.
pub fn evaluate_condition(
    condition: &RuleCondition,
    record_value: &FieldValue,
) -> Result<bool, ConfigurationError> {
    match &condition.operator {
        Operator::EqualTo => Ok(loosely_equal(record_value, &condition.value)),
        Operator::AnyOf => {
            let candidates = record_value.as_list();
            Ok(condition
                .value
                .split(',')
                .map(str::trim)
                .any(|token| candidates.iter().any(|c| c == token)))
        }
        Operator::GreaterThan => {
            let limit = numeric_operand(condition)?;
            Ok(record_value.as_number().is_some_and(|n| n > limit))
        }
        Operator::LessThan => {
            let limit = numeric_operand(condition)?;
            Ok(record_value.as_number().is_some_and(|n| n < limit))
        }
        Operator::Unknown(operator) => Err(ConfigurationError::UnknownOperator {
            condition_id: condition.id,
            operator: operator.clone(),
        }),
    }
}

/// All conditions must pass. A rule without conditions always matches.
pub fn evaluate_rule(rule: &ApprovalRule, context: &TransactionContext) -> bool {
    rule.conditions.iter().all(|condition| {
        match evaluate_condition(condition, context.get(&condition.field_id)) {
            Ok(matched) => matched,
            Err(err) => {
                error!(
                    rule_id = rule.id,
                    condition_id = condition.id,
                    %err,
                    "condition fails closed"
                );
                false
            }
        }
    })
}

// Numeric when both sides are numbers, exact string comparison otherwise.
fn loosely_equal(record_value: &FieldValue, expected: &str) -> bool {
    if let (Some(actual), Some(expected)) = (record_value.as_number(), parse_number(expected)) {
        return actual == expected;
    }
    record_value.as_text().is_some_and(|actual| actual == expected)
}

fn numeric_operand(condition: &RuleCondition) -> Result<f64, ConfigurationError> {
    parse_number(&condition.value).ok_or_else(|| ConfigurationError::UnparseableNumber {
        condition_id: condition.id,
        value: condition.value.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(operator: &str, value: &str) -> RuleCondition {
        RuleCondition {
            id: 1,
            field_id: "f".into(),
            operator: Operator::parse(operator),
            value: value.into(),
        }
    }

    fn rule_with(conditions: Vec<RuleCondition>) -> ApprovalRule {
        let mut rule = ApprovalRule::new(1, "r");
        rule.conditions = conditions;
        rule
    }

    #[test]
    fn equal_to_is_case_sensitive() {
        let cond = condition("equalto", "A");
        assert_eq!(evaluate_condition(&cond, &FieldValue::text("A")), Ok(true));
        assert_eq!(evaluate_condition(&cond, &FieldValue::text("a")), Ok(false));
        assert_eq!(evaluate_condition(&cond, &FieldValue::Null), Ok(false));
    }

    #[test]
    fn equal_to_coerces_numbers() {
        let cond = condition("is", "5.0");
        assert_eq!(evaluate_condition(&cond, &FieldValue::Number(5.0)), Ok(true));
        assert_eq!(evaluate_condition(&cond, &FieldValue::text("5")), Ok(true));
        assert_eq!(evaluate_condition(&cond, &FieldValue::Number(6.0)), Ok(false));
    }

    #[test]
    fn any_of_matches_trimmed_tokens() {
        let cond = condition("anyof", "1, 2 ,3");
        assert_eq!(evaluate_condition(&cond, &FieldValue::Number(2.0)), Ok(true));
        assert_eq!(evaluate_condition(&cond, &FieldValue::Number(4.0)), Ok(false));
        assert_eq!(evaluate_condition(&cond, &FieldValue::text("3")), Ok(true));
        assert_eq!(evaluate_condition(&cond, &FieldValue::Null), Ok(false));
    }

    #[test]
    fn any_of_accepts_multi_select_values() {
        let cond = condition("anyof", "east,west");
        assert_eq!(
            evaluate_condition(&cond, &FieldValue::list(["north", "west"])),
            Ok(true)
        );
        assert_eq!(
            evaluate_condition(&cond, &FieldValue::list(["north"])),
            Ok(false)
        );
    }

    #[test]
    fn numeric_comparisons_are_strict() {
        let gt = condition("greaterthan", "100");
        assert_eq!(evaluate_condition(&gt, &FieldValue::Number(100.5)), Ok(true));
        assert_eq!(evaluate_condition(&gt, &FieldValue::Number(100.0)), Ok(false));
        assert_eq!(evaluate_condition(&gt, &FieldValue::Null), Ok(false));

        let lt = condition("lessthan", "100");
        assert_eq!(evaluate_condition(&lt, &FieldValue::text("99")), Ok(true));
        assert_eq!(evaluate_condition(&lt, &FieldValue::Number(100.0)), Ok(false));
    }

    #[test]
    fn unparseable_comparison_value_is_a_configuration_error() {
        let cond = condition("greaterthan", "lots");
        assert_eq!(
            evaluate_condition(&cond, &FieldValue::Number(1.0)),
            Err(ConfigurationError::UnparseableNumber {
                condition_id: 1,
                value: "lots".into()
            })
        );
    }

    #[test]
    fn empty_rule_matches_unconditionally() {
        assert!(evaluate_rule(&rule_with(vec![]), &TransactionContext::default()));
    }

    #[test]
    fn every_condition_must_pass() {
        let mut second = condition("greaterthan", "10");
        second.id = 2;
        second.field_id = "amount".into();
        let rule = rule_with(vec![condition("equalto", "A"), second]);

        let ctx: TransactionContext = [("f", FieldValue::text("A")), ("amount", 50.0.into())]
            .into_iter()
            .collect();
        assert!(evaluate_rule(&rule, &ctx));

        let ctx: TransactionContext = [("f", FieldValue::text("A")), ("amount", 5.0.into())]
            .into_iter()
            .collect();
        assert!(!evaluate_rule(&rule, &ctx));
    }

    #[test]
    fn unknown_operator_fails_closed() {
        let rule = rule_with(vec![condition("between", "1-5")]);
        let ctx: TransactionContext = [("f", "3")].into_iter().collect();

        assert!(!evaluate_rule(&rule, &ctx));
    }
}
