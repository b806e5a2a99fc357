//! Save / restore / reset of the whole group set.
//!
//! Built on top of the regular jobs so restored groups go through the same
//! validation, uniqueness checks and notifications as any other create.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{GroupError, GroupResult};
use crate::events::EventSubject;
use crate::jobs::{CreateJob, Job, JobContext, ListJob, ReadJob};
use crate::rules::Group;

pub const FEATURE_NAME: &str = "automatic-groups";
pub const ACTIVE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupList {
    #[serde(rename = "groupList", default)]
    pub group_list: Vec<Group>,
}

/// Saved payload of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub version: String,
    pub data: GroupList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeatureStatus {
    fn from_result<T>(result: &GroupResult<T>) -> Self {
        match result {
            Ok(_) => Self {
                status: Status::Success,
                error: None,
            },
            Err(err) => Self {
                status: Status::Failed,
                error: Some(err.to_string()),
            },
        }
    }

    fn unsupported() -> Self {
        Self {
            status: Status::Failed,
            error: Some("Feature is not supported".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveQuery {
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAndStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<Feature>,
    pub status: FeatureStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub version: String,
    #[serde(rename = "mapFeaturesData")]
    pub features: BTreeMap<String, FeatureAndStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreQuery {
    #[serde(rename = "mapFeaturesData", default)]
    pub features: BTreeMap<String, Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "mapFeaturesStatus")]
    pub features: BTreeMap<String, FeatureStatus>,
}

pub struct Srr<'a> {
    ctx: &'a JobContext,
}

impl<'a> Srr<'a> {
    pub fn new(ctx: &'a JobContext) -> Self {
        Self { ctx }
    }

    /// Snapshot of every stored group.
    pub fn save(&self) -> GroupResult<Feature> {
        tracing::debug!("Saving automatic groups");
        let mut data = GroupList::default();
        for info in ListJob.run(self.ctx, ())? {
            data.group_list.push(ReadJob.run(self.ctx, info.id)?);
        }
        Ok(Feature {
            version: ACTIVE_VERSION.to_string(),
            data,
        })
    }

    /// Recreate the saved groups. Only allowed on an empty store; ids are
    /// assigned anew. No other mutation runs between the check and the last
    /// create.
    pub fn restore(&self, feature: &Feature) -> GroupResult<()> {
        tracing::debug!(version = %feature.version, "Restoring automatic groups");
        let _serial = self.ctx.lock_mutations();
        if !ListJob.run(self.ctx, ())?.is_empty() {
            return Err(GroupError::validation(
                "Restore operation cannot be completed: there are existing groups",
            ));
        }
        for group in &feature.data.group_list {
            tracing::debug!(name = %group.name, "Restoring group");
            let mut group = group.clone();
            group.id = None;
            CreateJob.run_locked(self.ctx, group)?;
        }
        Ok(())
    }

    /// Remove every group one by one so subscribers see each deletion.
    pub fn reset(&self) -> GroupResult<()> {
        tracing::debug!("Reset automatic groups");
        let _serial = self.ctx.lock_mutations();
        for info in ListJob.run(self.ctx, ())? {
            self.ctx.store.remove(info.id)?;
            self.ctx.events.publish(EventSubject::Deleted, info.id);
        }
        Ok(())
    }

    pub fn handle_save(&self, query: &SaveQuery) -> SaveResponse {
        let features = query
            .features
            .iter()
            .map(|name| {
                let entry = if name == FEATURE_NAME {
                    let result = self.save();
                    FeatureAndStatus {
                        status: FeatureStatus::from_result(&result),
                        feature: result.ok(),
                    }
                } else {
                    FeatureAndStatus {
                        feature: None,
                        status: FeatureStatus::unsupported(),
                    }
                };
                (name.clone(), entry)
            })
            .collect();
        SaveResponse {
            version: ACTIVE_VERSION.to_string(),
            features,
        }
    }

    pub fn handle_restore(&self, query: &RestoreQuery) -> StatusResponse {
        let features = query
            .features
            .iter()
            .map(|(name, feature)| {
                let status = if name == FEATURE_NAME {
                    FeatureStatus::from_result(&self.restore(feature))
                } else {
                    FeatureStatus::unsupported()
                };
                (name.clone(), status)
            })
            .collect();
        StatusResponse { features }
    }

    pub fn handle_reset(&self) -> StatusResponse {
        let status = match self.reset() {
            Ok(()) => FeatureStatus {
                status: Status::Success,
                error: None,
            },
            Err(err) => {
                tracing::error!(error = %err, "Reset of automatic groups failed");
                FeatureStatus {
                    status: Status::Failed,
                    error: Some("Reset of automatic groups failed".to_string()),
                }
            }
        };
        StatusResponse {
            features: BTreeMap::from([(FEATURE_NAME.to_string(), status)]),
        }
    }
}
