//! Query surface over the asset inventory consumed by the resolver.
//!
//! Every query returns the ordered set of matching asset ids; "no match" is
//! an empty set, never an error.

pub mod memory;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::GroupResult;
use crate::resolver::pattern;

pub use memory::MemoryAssetStore;

pub type AssetId = u64;
pub type AssetIdSet = BTreeSet<AssetId>;

/// Broad classification of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// datacenter, room, row or rack
    Location,
    Device,
    VirtualMachine,
    /// hypervisors, infrastructure services, connectors
    Virtualization,
}

impl AssetKind {
    pub fn from_type(asset_type: &str) -> Self {
        match asset_type {
            "datacenter" | "room" | "row" | "rack" => AssetKind::Location,
            "virtual-machine" | "virtual_machine" | "vm" => AssetKind::VirtualMachine,
            "hypervisor" | "infra-service" | "infra_service" | "connector" => {
                AssetKind::Virtualization
            }
            _ => AssetKind::Device,
        }
    }
}

/// Universe a negated condition is complemented against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    All,
    /// Everything except datacenters, rooms, rows and racks.
    NonLocation,
    /// Physical devices and virtual machines.
    DevicesAndVms,
    VirtualMachines,
}

impl Domain {
    pub fn contains(self, kind: AssetKind) -> bool {
        match self {
            Domain::All => true,
            Domain::NonLocation => kind != AssetKind::Location,
            Domain::DevicesAndVms => {
                matches!(kind, AssetKind::Device | AssetKind::VirtualMachine)
            }
            Domain::VirtualMachines => kind == AssetKind::VirtualMachine,
        }
    }
}

/// Text predicate applied to names and attribute values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Exact(String),
    Contains(String),
    /// `*` stands for any run of characters, the rest must match literally.
    Wildcard(String),
    AnyOf(Vec<TextMatch>),
}

impl TextMatch {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Exact(value) => text == value,
            TextMatch::Contains(value) => text.contains(value.as_str()),
            TextMatch::Wildcard(value) => pattern::wildcard_match(value, text),
            TextMatch::AnyOf(candidates) => candidates.iter().any(|m| m.matches(text)),
        }
    }
}

/// Selects extended attributes by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKey {
    Exact(&'static str),
    /// Indexed keys such as `ip.1`, `ip.2`.
    Prefix(&'static str),
}

impl AttributeKey {
    pub fn matches(self, key: &str) -> bool {
        match self {
            AttributeKey::Exact(k) => key == k,
            AttributeKey::Prefix(p) => key.starts_with(p),
        }
    }
}

/// `{id, name}` pair returned from resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: AssetId,
    pub name: String,
}

pub trait AssetStore: Send + Sync {
    /// Every asset of the domain.
    fn domain(&self, domain: Domain) -> GroupResult<AssetIdSet>;

    /// Assets whose display name matches.
    fn by_name(&self, m: &TextMatch) -> GroupResult<AssetIdSet>;

    fn by_internal_name(&self, m: &TextMatch) -> GroupResult<AssetIdSet>;

    /// Descendants of every location asset whose internal name matches,
    /// plus virtual machines hosted by hypervisors among those descendants.
    fn by_location(&self, m: &TextMatch) -> GroupResult<AssetIdSet>;

    fn by_type(&self, m: &TextMatch) -> GroupResult<AssetIdSet>;

    fn by_subtype(&self, m: &TextMatch) -> GroupResult<AssetIdSet>;

    /// Assets carrying an attribute selected by `keys` whose value matches.
    fn by_attribute(&self, keys: &[AttributeKey], m: &TextMatch) -> GroupResult<AssetIdSet>;

    /// Virtual machines whose hosting hypervisor carries a matching attribute.
    fn by_host_attribute(&self, keys: &[AttributeKey], m: &TextMatch)
    -> GroupResult<AssetIdSet>;

    /// Virtual machines whose hosting hypervisor's internal name matches.
    fn hosted_by(&self, m: &TextMatch) -> GroupResult<AssetIdSet>;

    /// `{id, name}` of the given assets, ordered by id. Unknown ids are skipped.
    fn describe(&self, ids: &AssetIdSet) -> GroupResult<Vec<AssetRef>>;
}
