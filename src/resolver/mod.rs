//! Compiles a group's rule tree into the concrete set of matching assets.
//!
//! Every condition is answered as an explicit id set from the asset store and
//! sibling sets are combined with the parent's logical operator (`AND` is
//! intersection, `OR` is union). Negated operators are the complement of the
//! positive match within a universe that depends on the field, so that e.g.
//! `location ISNOT x` never yields rooms or racks themselves.

pub mod pattern;

use std::sync::Arc;

use crate::errors::{GroupError, GroupResult};
use crate::inventory::{AssetIdSet, AssetRef, AssetStore, AttributeKey, Domain, TextMatch};
use crate::rules::{self, Condition, ConditionOp, Field, Group, LogicalOp, Rule, RuleGroup};
use crate::settings;
use crate::storage::GroupStore;

pub const DEFAULT_MAX_DEPTH: usize = 10;

const CONTACT_KEYS: &[AttributeKey] = &[
    AttributeKey::Exact("device.contact"),
    AttributeKey::Exact("contact_email"),
];
const HOSTNAME_KEYS: &[AttributeKey] = &[AttributeKey::Prefix("hostname.")];
const IP_KEYS: &[AttributeKey] = &[AttributeKey::Prefix("ip.")];
// attributes of the hypervisor hosting a virtual machine
const HOST_HOSTNAME_KEYS: &[AttributeKey] = &[AttributeKey::Exact("hostName")];
const HOST_IP_KEYS: &[AttributeKey] = &[AttributeKey::Exact("address")];

pub struct Resolver {
    store: Arc<GroupStore>,
    assets: Arc<dyn AssetStore>,
    reserved_asset: Option<String>,
    max_depth: usize,
}

impl Resolver {
    pub fn new(store: Arc<GroupStore>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            assets,
            reserved_asset: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn from_settings(
        store: Arc<GroupStore>,
        assets: Arc<dyn AssetStore>,
        cfg: &settings::Resolver,
    ) -> Self {
        Self {
            store,
            assets,
            reserved_asset: cfg.reserved_asset.clone(),
            max_depth: cfg.max_depth,
        }
    }

    /// Asset (by internal name) that is never part of a result.
    pub fn with_reserved_asset(mut self, name: impl Into<String>) -> Self {
        self.reserved_asset = Some(name.into());
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Resolve the stored group with the given id. Stored groups were checked
    /// when they were saved.
    pub fn resolve_id(&self, id: u64) -> GroupResult<Vec<AssetRef>> {
        let group = self.store.by_id(id)?;
        self.resolve_checked(&group)
    }

    /// Resolve a group definition given by the caller. It is always checked,
    /// whatever id it carries.
    pub fn resolve(&self, group: &Group) -> GroupResult<Vec<AssetRef>> {
        rules::check(group)?;
        self.resolve_checked(group)
    }

    fn resolve_checked(&self, group: &Group) -> GroupResult<Vec<AssetRef>> {
        let mut trail: Vec<u64> = group.id.into_iter().collect();
        let ids = self.compile(&group.rules, &mut trail)?;
        let found = self.finish(ids)?;
        tracing::debug!(id = ?group.id, name = %group.name, assets = found.len(), "Group resolved");
        Ok(found)
    }

    pub fn resolve_rules(&self, rules: &RuleGroup) -> GroupResult<Vec<AssetRef>> {
        let ids = self.compile(rules, &mut Vec::new())?;
        self.finish(ids)
    }

    fn finish(&self, mut ids: AssetIdSet) -> GroupResult<Vec<AssetRef>> {
        if let Some(reserved) = &self.reserved_asset {
            let hidden = self
                .assets
                .by_internal_name(&TextMatch::Exact(reserved.clone()))?;
            ids.retain(|id| !hidden.contains(id));
        }
        self.assets.describe(&ids)
    }

    /// `trail` holds the ids of the groups currently being resolved, outermost first.
    fn compile(&self, rules: &RuleGroup, trail: &mut Vec<u64>) -> GroupResult<AssetIdSet> {
        if rules.conditions.is_empty() {
            return Err(GroupError::validation("Any condition is expected"));
        }
        if rules.op == LogicalOp::Unknown {
            return Err(GroupError::validation("Valid logical operator is expected"));
        }

        let mut combined: Option<AssetIdSet> = None;
        for rule in &rules.conditions {
            let ids = match rule {
                Rule::Condition(cond) => self.condition(cond, trail)?,
                Rule::Group(nested) => self.compile(nested, trail)?,
            };
            combined = Some(match (combined, rules.op) {
                (None, _) => ids,
                (Some(acc), LogicalOp::And) => acc.intersection(&ids).copied().collect(),
                (Some(mut acc), _) => {
                    acc.extend(ids);
                    acc
                }
            });
        }
        Ok(combined.unwrap_or_default())
    }

    fn condition(&self, cond: &Condition, trail: &mut Vec<u64>) -> GroupResult<AssetIdSet> {
        let value = match cond.value.as_deref() {
            Some(value) if !value.is_empty() => value,
            _ => return Err(GroupError::validation("Value of condition is expected")),
        };
        if cond.op == ConditionOp::Unknown {
            return Err(GroupError::validation("Valid condition operator is expected"));
        }

        let positive = match cond.field {
            Field::Group => {
                if !matches!(cond.op, ConditionOp::Is | ConditionOp::IsNot) {
                    return Err(GroupError::validation(
                        "Valid value of condition for linked group is expected",
                    ));
                }
                self.group_reference(value, trail)?
            }
            field => self.leaf(field, cond.op, value)?,
        };

        if !cond.op.is_negated() {
            return Ok(positive);
        }
        let universe = self.assets.domain(complement_domain(cond.field))?;
        Ok(universe.difference(&positive).copied().collect())
    }

    /// Positive match of a non-group condition.
    fn leaf(&self, field: Field, op: ConditionOp, value: &str) -> GroupResult<AssetIdSet> {
        let text = pattern::text_match(op, value);
        let assets = self.assets.as_ref();
        match field {
            Field::Name => assets.by_name(&text),
            Field::InternalName => assets.by_internal_name(&text),
            Field::Location => assets.by_location(&text),
            Field::Type => assets.by_type(&text),
            Field::SubType => assets.by_subtype(&text),
            Field::Contact => assets.by_attribute(CONTACT_KEYS, &text),
            Field::HostName => self.device_or_vm(HOSTNAME_KEYS, HOST_HOSTNAME_KEYS, &text),
            Field::IpAddress => {
                let address = pattern::address_match(op, value);
                self.device_or_vm(IP_KEYS, HOST_IP_KEYS, &address)
            }
            Field::HostedBy => assets.hosted_by(&text),
            Field::Group | Field::Unknown => Err(GroupError::UnsupportedField(field.to_string())),
        }
    }

    /// Devices carry the value in their own attributes, virtual machines in
    /// those of their hosting hypervisor.
    fn device_or_vm(
        &self,
        device_keys: &[AttributeKey],
        host_keys: &[AttributeKey],
        m: &TextMatch,
    ) -> GroupResult<AssetIdSet> {
        let mut ids = self.assets.by_attribute(device_keys, m)?;
        ids.extend(self.assets.by_host_attribute(host_keys, m)?);
        let scope = self.assets.domain(Domain::DevicesAndVms)?;
        ids.retain(|id| scope.contains(id));
        Ok(ids)
    }

    fn group_reference(&self, value: &str, trail: &mut Vec<u64>) -> GroupResult<AssetIdSet> {
        let id: u64 = value.trim().parse().map_err(|_| {
            GroupError::not_found(format!("Group with id '{value}' was not found"))
        })?;

        if trail.contains(&id) {
            let path = trail
                .iter()
                .chain(std::iter::once(&id))
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            tracing::warn!(id, path = %path, "Cyclic group reference");
            return Err(GroupError::CyclicReference(path));
        }
        if trail.len() > self.max_depth {
            return Err(GroupError::CyclicReference(format!(
                "group references nested deeper than {}",
                self.max_depth
            )));
        }

        // the read acquisition ends with `by_id`, nothing is held while recursing
        let group = self.store.by_id(id)?;
        trail.push(id);
        let ids = self.compile(&group.rules, trail);
        trail.pop();
        ids
    }
}

/// Universe a negated condition on `field` is complemented against.
pub fn complement_domain(field: Field) -> Domain {
    match field {
        Field::InternalName | Field::Type | Field::SubType | Field::Contact => Domain::All,
        Field::HostName | Field::IpAddress => Domain::DevicesAndVms,
        Field::HostedBy => Domain::VirtualMachines,
        Field::Name | Field::Location | Field::Group | Field::Unknown => Domain::NonLocation,
    }
}
