use crate::errors::GroupError;
use crate::rules::types::{ConditionOp, Field, Group, LogicalOp, Rule, RuleGroup};

/// Validate a group before it is committed. Violations are reported depth-first,
/// left to right, and only the first one found is returned.
pub fn check(group: &Group) -> Result<(), GroupError> {
    if group.is_empty() {
        return Err(GroupError::validation("Group is empty"));
    }
    if group.name.trim().is_empty() {
        return Err(GroupError::validation("Name expected"));
    }
    check_rules(&group.rules)
}

/// Validate a rule tree on its own.
pub fn check_rules(rules: &RuleGroup) -> Result<(), GroupError> {
    if rules.conditions.is_empty() {
        return Err(GroupError::validation("Any condition is expected"));
    }
    if rules.op == LogicalOp::Unknown {
        return Err(GroupError::validation("Valid logical operator is expected"));
    }

    for rule in &rules.conditions {
        match rule {
            Rule::Condition(cond) => {
                if cond.field == Field::Unknown {
                    return Err(GroupError::validation("Valid field name is expected"));
                }
                if cond.op == ConditionOp::Unknown {
                    return Err(GroupError::validation("Valid condition operator is expected"));
                }
                if cond.value.as_deref().is_none_or(str::is_empty) {
                    return Err(GroupError::validation("Value of condition is expected"));
                }
                if cond.field == Field::Group
                    && !matches!(cond.op, ConditionOp::Is | ConditionOp::IsNot)
                {
                    return Err(GroupError::validation(
                        "Valid value of condition for linked group is expected",
                    ));
                }
            }
            Rule::Group(nested) => check_rules(nested)?,
        }
    }

    Ok(())
}
