use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::errors::GroupError;
use crate::lock::{AccessLock, ReadGuard, WriteGuard};
use crate::rules::Group;
use crate::settings::{LockBackend, Storage as StorageCfg};

/// On-disk layout of the store: the id counter plus every group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupDb {
    #[serde(rename = "last-id", default)]
    pub last_id: u64,
    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: u64,
    pub name: String,
}

#[derive(Default)]
struct Slot {
    loaded: bool,
    db: GroupDb,
}

/// Persisted collection of group definitions.
///
/// The file is loaded lazily on first access and rewritten in full on every
/// mutation. Reads take a shared acquisition of the store lock, mutations an
/// exclusive one for their whole duration.
pub struct GroupStore {
    path: PathBuf,
    slot: AccessLock<Slot>,
}

impl GroupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: AccessLock::default(),
        }
    }

    /// Store whose writers are also serialized through an advisory lock on
    /// `lock_path`, for several service instances sharing one file.
    pub fn with_file_lock(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: AccessLock::with_durable(Slot::default(), lock_path),
        }
    }

    pub fn open(cfg: &StorageCfg) -> Self {
        match cfg.lock {
            LockBackend::Process => Self::new(&cfg.path),
            LockBackend::File => Self::with_file_lock(&cfg.path, cfg.lock_file()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn by_id(&self, id: u64) -> Result<Group, GroupError> {
        let slot = self.read_slot()?;
        slot.db
            .groups
            .iter()
            .find(|g| g.id == Some(id))
            .cloned()
            .ok_or_else(|| GroupError::not_found(format!("Group with id '{id}' was not found")))
    }

    pub fn by_name(&self, name: &str) -> Result<Group, GroupError> {
        let slot = self.read_slot()?;
        slot.db
            .groups
            .iter()
            .find(|g| g.name == name)
            .cloned()
            .ok_or_else(|| GroupError::not_found(format!("Group with name '{name}' was not found")))
    }

    pub fn names(&self) -> Result<Vec<String>, GroupError> {
        let slot = self.read_slot()?;
        Ok(slot.db.groups.iter().map(|g| g.name.clone()).collect())
    }

    pub fn ids(&self) -> Result<Vec<u64>, GroupError> {
        let slot = self.read_slot()?;
        Ok(slot.db.groups.iter().filter_map(|g| g.id).collect())
    }

    /// `(id, name)` of every stored group, in insertion order.
    pub fn list(&self) -> Result<Vec<GroupInfo>, GroupError> {
        let slot = self.read_slot()?;
        Ok(slot
            .db
            .groups
            .iter()
            .filter_map(|g| {
                g.id.map(|id| GroupInfo {
                    id,
                    name: g.name.clone(),
                })
            })
            .collect())
    }

    /// Insert a group without id (a fresh id is assigned) or overwrite the
    /// stored group with the same id. Overwriting an id that is not stored is
    /// a no-op; see [`GroupStore::save_unique`] for the checked variant.
    pub fn save(&self, group: &Group) -> Result<Group, GroupError> {
        let mut slot = self.write_slot()?;
        self.save_in(&mut slot, group)
    }

    /// Like [`GroupStore::save`], but the group's id must be stored (when set)
    /// and no other group may carry its name. Both checks run under the same
    /// write acquisition as the save itself.
    pub fn save_unique(&self, group: &Group) -> Result<Group, GroupError> {
        let mut slot = self.write_slot()?;
        if let Some(id) = group.id {
            if !slot.db.groups.iter().any(|g| g.id == Some(id)) {
                return Err(GroupError::not_found(format!(
                    "Group with id '{id}' was not found"
                )));
            }
        }
        if slot
            .db
            .groups
            .iter()
            .any(|g| g.name == group.name && g.id != group.id)
        {
            return Err(GroupError::DuplicateName(group.name.clone()));
        }
        self.save_in(&mut slot, group)
    }

    fn save_in(&self, slot: &mut WriteGuard<'_, Slot>, group: &Group) -> Result<Group, GroupError> {
        let mut to_save = group.clone();

        self.mutate(slot, |db| {
            match to_save.id {
                None => {
                    db.last_id += 1;
                    to_save.id = Some(db.last_id);
                    db.groups.push(to_save.clone());
                }
                Some(id) => match db.groups.iter_mut().find(|g| g.id == Some(id)) {
                    Some(existing) => *existing = to_save.clone(),
                    None => tracing::warn!(id, "Save of unknown group id ignored"),
                },
            }
        })?;

        tracing::debug!(id = ?to_save.id, name = %to_save.name, "Group saved");
        Ok(to_save)
    }

    pub fn remove(&self, id: u64) -> Result<(), GroupError> {
        let mut slot = self.write_slot()?;
        if !slot.db.groups.iter().any(|g| g.id == Some(id)) {
            return Err(GroupError::not_found(format!("Id '{id}' was not found")));
        }
        self.mutate(&mut slot, |db| db.groups.retain(|g| g.id != Some(id)))?;
        tracing::debug!(id, "Group removed");
        Ok(())
    }

    /// Drop every group. The id counter keeps its value so ids are never reused.
    pub fn clear(&self) -> Result<(), GroupError> {
        let mut slot = self.write_slot()?;
        self.mutate(&mut slot, |db| db.groups.clear())?;
        tracing::info!(path = %self.path.display(), "Group store cleared");
        Ok(())
    }

    /// Apply `change` and persist. The in-memory state is rolled back when the
    /// file cannot be written.
    fn mutate(
        &self,
        slot: &mut WriteGuard<'_, Slot>,
        change: impl FnOnce(&mut GroupDb),
    ) -> Result<(), GroupError> {
        let snapshot = slot.db.clone();
        change(&mut slot.db);
        if let Err(err) = persist(&self.path, &slot.db) {
            slot.db = snapshot;
            tracing::error!(path = %self.path.display(), error = %err, "Failed to persist group store");
            return Err(err);
        }
        Ok(())
    }

    fn read_slot(&self) -> Result<ReadGuard<'_, Slot>, GroupError> {
        // pick up what other instances wrote since the last access
        if self.slot.is_durable() {
            drop(self.write_slot()?);
        }
        {
            let slot = self.slot.read();
            if slot.loaded {
                return Ok(slot);
            }
        }
        {
            let mut slot = self.slot.write()?;
            if !slot.loaded {
                slot.db = load(&self.path)?;
                slot.loaded = true;
            }
        }
        Ok(self.slot.read())
    }

    fn write_slot(&self) -> Result<WriteGuard<'_, Slot>, GroupError> {
        let mut slot = self.slot.write()?;
        // another instance may have written the file since we last read it
        if !slot.loaded || slot.is_durable() {
            slot.db = load(&self.path)?;
            slot.loaded = true;
        }
        Ok(slot)
    }
}

fn storage_error(path: &Path, source: std::io::Error) -> GroupError {
    GroupError::Storage {
        path: path.display().to_string(),
        source,
    }
}

fn load(path: &Path) -> Result<GroupDb, GroupError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Group store not found, starting empty");
        return Ok(GroupDb::default());
    }
    let contents = fs::read_to_string(path).map_err(|e| storage_error(path, e))?;
    if contents.trim().is_empty() {
        return Ok(GroupDb::default());
    }
    let db: GroupDb = serde_json::from_str(&contents)?;
    tracing::debug!(path = %path.display(), groups = db.groups.len(), "Group store loaded");
    Ok(db)
}

/// Write to a temporary file next to the target and rename it into place.
fn persist(path: &Path, db: &GroupDb) -> Result<(), GroupError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| storage_error(path, e))?;

    let tmp = NamedTempFile::new_in(&dir).map_err(|e| storage_error(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, db)?;
        writer.flush().map_err(|e| storage_error(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| storage_error(path, e))?;
    tmp.persist(path).map_err(|e| storage_error(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Condition, ConditionOp, Field, RuleGroup};

    fn group(name: &str) -> Group {
        Group::new(
            name,
            RuleGroup::and().with(Condition::new(Field::Name, ConditionOp::Contains, "srv")),
        )
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::new(dir.path().join("groups.json"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.ids().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_assigns_increasing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::new(dir.path().join("groups.json"));
        let a = store.save(&group("a")).unwrap();
        let b = store.save(&group("b")).unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));

        store.remove(2).unwrap();
        let c = store.save(&group("c")).unwrap();
        assert_eq!(c.id, Some(3));
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groups.json");
        let store = GroupStore::new(&path);
        store.save(&group("a")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["last-id"], 1);
        assert_eq!(raw["groups"][0]["name"], "a");
        assert_eq!(raw["groups"][0]["id"], 1);
    }

    #[test]
    fn test_save_unknown_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::new(dir.path().join("groups.json"));
        let mut ghost = group("ghost");
        ghost.id = Some(77);
        let returned = store.save(&ghost).unwrap();
        assert_eq!(returned.id, Some(77));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groups.json");
        let store = GroupStore::new(&path);
        assert!(store.list().unwrap().is_empty());

        // a non-empty directory where the file should be makes the rename fail
        fs::create_dir_all(path.join("blocker")).unwrap();
        let err = store.save(&group("a")).unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert!(store.names().unwrap().is_empty());
    }
}
