use autogroup::rules::{Condition, ConditionOp, Field, Group, LogicalOp, Rule, RuleGroup};

pub fn cond(field: Field, op: ConditionOp, value: impl Into<String>) -> Condition {
    Condition::new(field, op, value)
}

/// Builder for group definitions
pub struct GroupBuilder {
    name: String,
    rules: RuleGroup,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: RuleGroup::and(),
        }
    }

    pub fn or(mut self) -> Self {
        self.rules.op = LogicalOp::Or;
        self
    }

    pub fn with_op(mut self, op: LogicalOp) -> Self {
        self.rules.op = op;
        self
    }

    pub fn condition(mut self, field: Field, op: ConditionOp, value: impl Into<String>) -> Self {
        self.rules.conditions.push(Rule::Condition(cond(field, op, value)));
        self
    }

    pub fn group_link(self, op: ConditionOp, id: u64) -> Self {
        self.condition(Field::Group, op, id.to_string())
    }

    pub fn nested(mut self, rules: RuleGroup) -> Self {
        self.rules.conditions.push(Rule::Group(rules));
        self
    }

    pub fn build(self) -> Group {
        Group::new(self.name, self.rules)
    }
}
