use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, persisted rule definition. `id` stays empty until the group is stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: RuleGroup,
}

impl Group {
    pub fn new(name: impl Into<String>, rules: RuleGroup) -> Self {
        Self {
            id: None,
            name: name.into(),
            rules,
        }
    }

    /// Nothing was filled in at all.
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_empty() && self.rules.is_empty()
    }
}

/// AND/OR combination of conditions and nested rule groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    #[serde(rename = "operator", default)]
    pub op: LogicalOp,
    #[serde(default)]
    pub conditions: Vec<Rule>,
}

impl RuleGroup {
    pub fn new(op: LogicalOp) -> Self {
        Self {
            op,
            conditions: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(LogicalOp::And)
    }

    pub fn or() -> Self {
        Self::new(LogicalOp::Or)
    }

    pub fn with(mut self, rule: impl Into<Rule>) -> Self {
        self.conditions.push(rule.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.op == LogicalOp::Unknown && self.conditions.is_empty()
    }
}

/// One entry of a rule group: either a leaf predicate or a nested group.
///
/// On the wire an entry carrying a `field` key is a condition, anything else
/// is read as a nested rule group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Rule {
    Condition(Condition),
    Group(RuleGroup),
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        // decode errors of the chosen variant are reported as they are
        let rule = if value.get("field").is_some() {
            Condition::deserialize(value).map(Rule::Condition)
        } else {
            RuleGroup::deserialize(value).map(Rule::Group)
        };
        rule.map_err(de::Error::custom)
    }
}

impl From<Condition> for Rule {
    fn from(value: Condition) -> Self {
        Rule::Condition(value)
    }
}

impl From<RuleGroup> for Rule {
    fn from(value: RuleGroup) -> Self {
        Rule::Group(value)
    }
}

/// A single field/operator/value predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: Field,
    #[serde(rename = "operator", default)]
    pub op: ConditionOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Condition {
    pub fn new(field: Field, op: ConditionOp, value: impl Into<String>) -> Self {
        Self {
            field,
            op,
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[default]
    #[serde(rename = "UNKNOWN", other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOp {
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "DOESNOTCONTAIN")]
    DoesNotContain,
    #[serde(rename = "IS")]
    Is,
    #[serde(rename = "ISNOT")]
    IsNot,
    #[default]
    #[serde(rename = "UNKNOWN", other)]
    Unknown,
}

impl ConditionOp {
    /// `IsNot` and `DoesNotContain` are answered as the complement of their positive form.
    pub fn is_negated(self) -> bool {
        matches!(self, ConditionOp::IsNot | ConditionOp::DoesNotContain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "asset")]
    InternalName,
    #[serde(rename = "location")]
    Location,
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "subtype")]
    SubType,
    #[serde(rename = "contact")]
    Contact,
    #[serde(rename = "host-name")]
    HostName,
    #[serde(rename = "ip-address")]
    IpAddress,
    #[serde(rename = "hosted-by")]
    HostedBy,
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::InternalName => "asset",
            Field::Location => "location",
            Field::Type => "type",
            Field::SubType => "subtype",
            Field::Contact => "contact",
            Field::HostName => "host-name",
            Field::IpAddress => "ip-address",
            Field::HostedBy => "hosted-by",
            Field::Group => "group",
            Field::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
