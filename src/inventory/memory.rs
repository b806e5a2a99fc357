use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{GroupError, GroupResult};
use crate::inventory::{
    AssetId, AssetIdSet, AssetKind, AssetRef, AssetStore, AttributeKey, Domain, TextMatch,
};

/// Inventory document: a location tree of items plus links between assets.
///
/// ```json
/// {
///   "items": [
///     {"type": "datacenter", "name": "datacenter-3", "ext-name": "DC1", "items": [
///       {"type": "device", "subtype": "server", "name": "server-7", "ext-name": "srv1",
///        "attrs": {"ip.1": "10.0.0.7", "hostname.1": "srv1.local"}}
///     ]}
///   ],
///   "links": [{"src": "hypervisor-1", "dest": "vm-1", "type": "vmware.esxi.hosts.vm"}]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct InventoryDoc {
    #[serde(default)]
    pub items: Vec<ItemDoc>,
    #[serde(default)]
    pub links: Vec<LinkDoc>,
}

#[derive(Debug, Deserialize)]
pub struct ItemDoc {
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub name: String,
    #[serde(rename = "ext-name", default)]
    pub ext_name: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub items: Vec<ItemDoc>,
}

#[derive(Debug, Deserialize)]
pub struct LinkDoc {
    pub src: String,
    pub dest: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

#[derive(Debug, Clone)]
struct Asset {
    id: AssetId,
    name: String,
    ext_name: Option<String>,
    asset_type: String,
    subtype: String,
    kind: AssetKind,
    parent: Option<AssetId>,
    /// hypervisor hosting this virtual machine
    host: Option<AssetId>,
    attrs: BTreeMap<String, String>,
}

impl Asset {
    fn attribute_matches(&self, keys: &[AttributeKey], m: &TextMatch) -> bool {
        self.attrs
            .iter()
            .filter(|(key, _)| keys.iter().any(|k| k.matches(key)))
            .any(|(_, raw)| attribute_values(raw).iter().any(|v| m.matches(v)))
    }
}

/// Attribute values may hold a list such as `[/10.0.0.1,/10.0.0.2,]`.
fn attribute_values(raw: &str) -> Vec<&str> {
    match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(inner) => inner
            .split(',')
            .map(|v| v.trim().trim_start_matches('/'))
            .filter(|v| !v.is_empty())
            .collect(),
        None => vec![raw],
    }
}

/// Asset inventory held in memory. Ids are assigned from 1 in depth-first
/// order of the document.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    assets: Vec<Asset>,
    children: HashMap<AssetId, Vec<AssetId>>,
}

impl MemoryAssetStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the inventory document at `path`. A missing file yields an empty
    /// inventory.
    pub fn load(path: &Path) -> GroupResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Inventory file not found, starting with an empty inventory");
            return Ok(Self::empty());
        }
        let contents = fs::read_to_string(path).map_err(|source| GroupError::Storage {
            path: path.display().to_string(),
            source,
        })?;
        let doc: InventoryDoc = serde_json::from_str(&contents)?;
        let store = Self::from_doc(doc)?;
        tracing::info!(path = %path.display(), assets = store.len(), "Inventory loaded");
        Ok(store)
    }

    pub fn from_json(value: serde_json::Value) -> GroupResult<Self> {
        let doc: InventoryDoc = serde_json::from_value(value)?;
        Self::from_doc(doc)
    }

    pub fn from_doc(doc: InventoryDoc) -> GroupResult<Self> {
        let mut store = Self::empty();
        for item in doc.items {
            store.insert(item, None);
        }

        let mut by_name = HashMap::new();
        for asset in &store.assets {
            if by_name.insert(asset.name.clone(), asset.id).is_some() {
                return Err(GroupError::Inventory(format!(
                    "Duplicate asset name '{}'",
                    asset.name
                )));
            }
        }

        for link in doc.links {
            let lookup = |name: &str| {
                by_name.get(name).copied().ok_or_else(|| {
                    GroupError::Inventory(format!("Link references unknown asset '{name}'"))
                })
            };
            let src = lookup(&link.src)?;
            let dest = lookup(&link.dest)?;
            if link.link_type.ends_with("hosts.vm") {
                store.asset_mut(dest).host = Some(src);
            }
        }
        Ok(store)
    }

    fn insert(&mut self, item: ItemDoc, parent: Option<AssetId>) {
        let id = self.assets.len() as AssetId + 1;
        let kind = AssetKind::from_type(&item.asset_type);
        self.assets.push(Asset {
            id,
            name: item.name,
            ext_name: item.ext_name,
            subtype: item.subtype.unwrap_or_default(),
            asset_type: item.asset_type,
            kind,
            parent,
            host: None,
            attrs: item.attrs,
        });
        if let Some(parent) = parent {
            self.children.entry(parent).or_default().push(id);
        }
        for child in item.items {
            self.insert(child, Some(id));
        }
    }

    // ids are dense and start at 1
    fn asset(&self, id: AssetId) -> Option<&Asset> {
        id.checked_sub(1).and_then(|i| self.assets.get(i as usize))
    }

    fn asset_mut(&mut self, id: AssetId) -> &mut Asset {
        &mut self.assets[(id - 1) as usize]
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Id of the asset with the given internal name.
    pub fn id_of(&self, name: &str) -> Option<AssetId> {
        self.assets.iter().find(|a| a.name == name).map(|a| a.id)
    }

    pub fn parent_of(&self, id: AssetId) -> Option<AssetId> {
        self.asset(id).and_then(|a| a.parent)
    }

    fn select(&self, pred: impl Fn(&Asset) -> bool) -> AssetIdSet {
        self.assets.iter().filter(|a| pred(a)).map(|a| a.id).collect()
    }

    fn descendants(&self, root: AssetId, out: &mut AssetIdSet) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for &child in self.children.get(&id).into_iter().flatten() {
                if out.insert(child) {
                    stack.push(child);
                }
            }
        }
    }
}

impl AssetStore for MemoryAssetStore {
    fn domain(&self, domain: Domain) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| domain.contains(a.kind)))
    }

    // assets without a display name never match
    fn by_name(&self, m: &TextMatch) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| a.ext_name.as_deref().is_some_and(|name| m.matches(name))))
    }

    fn by_internal_name(&self, m: &TextMatch) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| m.matches(&a.name)))
    }

    fn by_location(&self, m: &TextMatch) -> GroupResult<AssetIdSet> {
        let mut ids = AssetIdSet::new();
        for location in self
            .assets
            .iter()
            .filter(|a| a.kind == AssetKind::Location && m.matches(&a.name))
        {
            self.descendants(location.id, &mut ids);
        }
        let hosted = self.select(|a| a.host.is_some_and(|host| ids.contains(&host)));
        ids.extend(hosted);
        Ok(ids)
    }

    fn by_type(&self, m: &TextMatch) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| m.matches(&a.asset_type)))
    }

    fn by_subtype(&self, m: &TextMatch) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| !a.subtype.is_empty() && m.matches(&a.subtype)))
    }

    fn by_attribute(&self, keys: &[AttributeKey], m: &TextMatch) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| a.attribute_matches(keys, m)))
    }

    fn by_host_attribute(
        &self,
        keys: &[AttributeKey],
        m: &TextMatch,
    ) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| {
            a.host
                .and_then(|host| self.asset(host))
                .is_some_and(|host| host.attribute_matches(keys, m))
        }))
    }

    fn hosted_by(&self, m: &TextMatch) -> GroupResult<AssetIdSet> {
        Ok(self.select(|a| {
            a.host
                .and_then(|host| self.asset(host))
                .is_some_and(|host| m.matches(&host.name))
        }))
    }

    fn describe(&self, ids: &AssetIdSet) -> GroupResult<Vec<AssetRef>> {
        Ok(ids
            .iter()
            .filter_map(|&id| self.asset(id))
            .map(|a| AssetRef {
                id: a.id,
                name: a.name.clone(),
            })
            .collect())
    }
}
