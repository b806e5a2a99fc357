use std::path::PathBuf;
use std::sync::Arc;

use autogroup::errors::GroupError;
use autogroup::events::EventBus;
use autogroup::inventory::MemoryAssetStore;
use autogroup::jobs::{Dispatcher, JobContext};
use autogroup::resolver::Resolver;
use autogroup::rules::Group;
use autogroup::storage::GroupStore;
use serde_json::Value;
use tempfile::TempDir;

/// Group service over a temporary store and a fixture inventory
pub struct TestService {
    pub dispatcher: Dispatcher,
    pub events: EventBus,
    _dir: TempDir,
    path: PathBuf,
}

impl TestService {
    pub fn new(inventory: Value) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("groups.json");
        let store = Arc::new(GroupStore::new(&path));
        let assets =
            Arc::new(MemoryAssetStore::from_json(inventory).expect("Invalid fixture inventory"));
        let resolver = Arc::new(
            Resolver::new(store.clone(), assets).with_reserved_asset("rackcontroller-0"),
        );
        let events = EventBus::new();
        let dispatcher = Dispatcher::new(JobContext::new(store, resolver, events.clone()));
        Self {
            dispatcher,
            events,
            _dir: dir,
            path,
        }
    }

    pub fn store_path(&self) -> &PathBuf {
        &self.path
    }

    pub fn store(&self) -> &GroupStore {
        &self.dispatcher.context().store
    }

    pub fn call(&self, subject: &str, payload: &Value) -> Result<Value, GroupError> {
        let body = serde_json::to_vec(payload).expect("Failed to encode payload");
        self.dispatcher.handle(subject, &body)
    }

    pub fn create(&self, group: &Group) -> Group {
        let out = self
            .call("CREATE", &serde_json::to_value(group).unwrap())
            .expect("Failed to create group");
        serde_json::from_value(out).expect("Invalid CREATE output")
    }

    pub fn try_create(&self, group: &Group) -> Result<Value, GroupError> {
        self.call("CREATE", &serde_json::to_value(group).unwrap())
    }

    /// Names of the assets the stored group resolves to, in id order.
    pub fn resolve(&self, id: u64) -> Vec<String> {
        let out = self
            .call("RESOLVE", &Value::from(id))
            .expect("Failed to resolve group");
        names(&out)
    }

    /// Create the group, resolve it and delete it again.
    pub fn resolve_new(&self, group: &Group) -> Vec<String> {
        let created = self.create(group);
        let id = created.id.expect("Created group has no id");
        let found = self.resolve(id);
        self.call("DELETE", &Value::from(id))
            .expect("Failed to delete group");
        found
    }
}

pub fn names(out: &Value) -> Vec<String> {
    out.as_array()
        .expect("Resolve output is not a list")
        .iter()
        .map(|a| a["name"].as_str().unwrap_or_default().to_string())
        .collect()
}
