//! Rule trees describing which assets belong to a group.

pub mod types;
pub mod validate;

pub use types::{Condition, ConditionOp, Field, Group, LogicalOp, Rule, RuleGroup};
pub use validate::{check, check_rules};
