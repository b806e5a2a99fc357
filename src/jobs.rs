//! Request handlers for the command channel.
//!
//! Each subject is a [`Job`] with its own input and output types. The
//! [`Dispatcher`] decodes the payload, runs the job to completion on the
//! blocking worker pool and wraps the outcome in a [`Response`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{GroupError, GroupResult};
use crate::events::{EventBus, EventSubject};
use crate::inventory::AssetRef;
use crate::resolver::Resolver;
use crate::rules::{self, Group};
use crate::storage::{GroupInfo, GroupStore};

/// Command channel subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Create,
    Update,
    Delete,
    List,
    Read,
    Resolve,
}

impl Subject {
    pub fn parse(subject: &str) -> Option<Self> {
        match subject.to_ascii_uppercase().as_str() {
            "CREATE" => Some(Subject::Create),
            "UPDATE" => Some(Subject::Update),
            "DELETE" => Some(Subject::Delete),
            "LIST" => Some(Subject::List),
            "READ" => Some(Subject::Read),
            "RESOLVE" => Some(Subject::Resolve),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Create => "CREATE",
            Subject::Update => "UPDATE",
            Subject::Delete => "DELETE",
            Subject::List => "LIST",
            Subject::Read => "READ",
            Subject::Resolve => "RESOLVE",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handles shared by every job.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<GroupStore>,
    pub resolver: Arc<Resolver>,
    pub events: EventBus,
    // name uniqueness is checked before saving, so mutations run one at a time
    mutations: Arc<Mutex<()>>,
}

impl JobContext {
    pub fn new(store: Arc<GroupStore>, resolver: Arc<Resolver>, events: EventBus) -> Self {
        Self {
            store,
            resolver,
            events,
            mutations: Arc::new(Mutex::new(())),
        }
    }

    /// Held by every job that changes the store.
    pub fn lock_mutations(&self) -> MutexGuard<'_, ()> {
        self.mutations.lock()
    }
}

pub trait Job {
    const SUBJECT: Subject;
    /// `false` for jobs that ignore the payload.
    const TAKES_INPUT: bool = true;

    type Input: DeserializeOwned + Default;
    type Output: Serialize;

    fn run(&self, ctx: &JobContext, input: Self::Input) -> GroupResult<Self::Output>;
}

pub struct CreateJob;
pub struct UpdateJob;
pub struct DeleteJob;
pub struct ListJob;
pub struct ReadJob;
pub struct ResolveJob;

impl Job for CreateJob {
    const SUBJECT: Subject = Subject::Create;
    type Input = Group;
    type Output = Group;

    fn run(&self, ctx: &JobContext, group: Group) -> GroupResult<Group> {
        let _serial = ctx.lock_mutations();
        self.run_locked(ctx, group)
    }
}

impl CreateJob {
    /// Create with [`JobContext::lock_mutations`] already held by the caller.
    pub fn run_locked(&self, ctx: &JobContext, mut group: Group) -> GroupResult<Group> {
        group.id = None;
        rules::check(&group)?;

        let created = ctx.store.save_unique(&group)?;
        if let Some(id) = created.id {
            tracing::info!(id, name = %created.name, "Group created");
            ctx.events.publish(EventSubject::Created, id);
        }
        Ok(created)
    }
}

impl Job for UpdateJob {
    const SUBJECT: Subject = Subject::Update;
    type Input = Group;
    type Output = Group;

    fn run(&self, ctx: &JobContext, group: Group) -> GroupResult<Group> {
        let Some(id) = group.id else {
            return Err(GroupError::validation("Group id is expected"));
        };
        rules::check(&group)?;

        let _serial = ctx.lock_mutations();
        let updated = ctx.store.save_unique(&group)?;
        tracing::info!(id, name = %updated.name, "Group updated");
        ctx.events.publish(EventSubject::Updated, id);
        Ok(updated)
    }
}

/// One id or a list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IdList {
    One(u64),
    Many(Vec<u64>),
}

impl Default for IdList {
    fn default() -> Self {
        IdList::Many(Vec::new())
    }
}

impl IdList {
    pub fn into_vec(self) -> Vec<u64> {
        match self {
            IdList::One(id) => vec![id],
            IdList::Many(ids) => ids,
        }
    }
}

impl Job for DeleteJob {
    const SUBJECT: Subject = Subject::Delete;
    type Input = IdList;
    /// `[{"<id>": "Ok"}, {"<id>": "<error>"}]`
    type Output = Vec<BTreeMap<String, String>>;

    fn run(&self, ctx: &JobContext, ids: IdList) -> GroupResult<Self::Output> {
        let _serial = ctx.lock_mutations();
        let out = ids
            .into_vec()
            .into_iter()
            .map(|id| {
                let status = match ctx.store.remove(id) {
                    Ok(()) => {
                        tracing::info!(id, "Group deleted");
                        ctx.events.publish(EventSubject::Deleted, id);
                        "Ok".to_string()
                    }
                    Err(err) => {
                        tracing::warn!(id, error = %err, "Group not deleted");
                        err.to_string()
                    }
                };
                BTreeMap::from([(id.to_string(), status)])
            })
            .collect();
        Ok(out)
    }
}

impl Job for ListJob {
    const SUBJECT: Subject = Subject::List;
    const TAKES_INPUT: bool = false;
    type Input = ();
    type Output = Vec<GroupInfo>;

    fn run(&self, ctx: &JobContext, _: ()) -> GroupResult<Vec<GroupInfo>> {
        ctx.store.list()
    }
}

impl Job for ReadJob {
    const SUBJECT: Subject = Subject::Read;
    type Input = u64;
    type Output = Group;

    fn run(&self, ctx: &JobContext, id: u64) -> GroupResult<Group> {
        ctx.store.by_id(id)
    }
}

/// A stored group id, or a group definition to preview.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResolveInput {
    Id(u64),
    Group(Group),
}

impl Default for ResolveInput {
    fn default() -> Self {
        ResolveInput::Group(Group::default())
    }
}

impl Job for ResolveJob {
    const SUBJECT: Subject = Subject::Resolve;
    type Input = ResolveInput;
    type Output = Vec<AssetRef>;

    fn run(&self, ctx: &JobContext, input: ResolveInput) -> GroupResult<Vec<AssetRef>> {
        match input {
            ResolveInput::Id(id) => ctx.resolver.resolve_id(id),
            ResolveInput::Group(group) => ctx.resolver.resolve(&group),
        }
    }
}

/// Decode `payload`, run the job and encode its output.
pub fn execute<J: Job>(job: &J, ctx: &JobContext, payload: &[u8]) -> GroupResult<Value> {
    let input = if J::TAKES_INPUT {
        decode::<J::Input>(payload)?
    } else {
        J::Input::default()
    };
    let out = job.run(ctx, input)?;
    tracing::debug!(subject = %J::SUBJECT, "Job finished");
    Ok(serde_json::to_value(out)?)
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> GroupResult<T> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(GroupError::BadRequest(
            "Wrong input data: payload is empty".to_string(),
        ));
    }
    serde_json::from_slice(payload).map_err(|err| {
        tracing::debug!(error = %err, "Payload decode failed");
        GroupError::BadRequest("Wrong input data: format of payload is incorrect".to_string())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Reply envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(subject: impl Into<String>, out: Value) -> Self {
        Self {
            status: Status::Ok,
            subject: subject.into(),
            out: Some(out),
            error: None,
        }
    }

    pub fn error(subject: impl Into<String>, err: &GroupError) -> Self {
        Self {
            status: Status::Error,
            subject: subject.into(),
            out: None,
            error: Some(err.to_string()),
        }
    }

    pub fn from_result(subject: impl Into<String>, result: &GroupResult<Value>) -> Self {
        match result {
            Ok(out) => Self::ok(subject, out.clone()),
            Err(err) => Self::error(subject, err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Routes subjects to jobs.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: JobContext,
}

impl Dispatcher {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    /// Run the job for `subject` on the calling thread.
    pub fn handle(&self, subject: &str, payload: &[u8]) -> GroupResult<Value> {
        let Some(parsed) = Subject::parse(subject) else {
            return Err(GroupError::BadRequest(format!(
                "Unsupported subject '{subject}'"
            )));
        };
        tracing::debug!(subject = %parsed, bytes = payload.len(), "Running job");

        let ctx = &self.ctx;
        let result = match parsed {
            Subject::Create => execute(&CreateJob, ctx, payload),
            Subject::Update => execute(&UpdateJob, ctx, payload),
            Subject::Delete => execute(&DeleteJob, ctx, payload),
            Subject::List => execute(&ListJob, ctx, payload),
            Subject::Read => execute(&ReadJob, ctx, payload),
            Subject::Resolve => execute(&ResolveJob, ctx, payload),
        };
        if let Err(err) = &result {
            tracing::error!(subject = %parsed, kind = err.kind(), error = %err, "Job failed");
        }
        result
    }

    /// `handle` and wrap the outcome in the reply envelope.
    pub fn respond(&self, subject: &str, payload: &[u8]) -> Response {
        Response::from_result(subject, &self.handle(subject, payload))
    }

    /// Run the job on the blocking worker pool.
    pub async fn dispatch(&self, subject: String, payload: Vec<u8>) -> GroupResult<Value> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.handle(&subject, &payload))
            .await
            .map_err(|err| GroupError::Io(std::io::Error::other(format!("Job aborted: {err}"))))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::MemoryAssetStore;
    use serde_json::json;

    fn dispatcher(dir: &tempfile::TempDir) -> Dispatcher {
        let store = Arc::new(GroupStore::new(dir.path().join("groups.json")));
        let assets = Arc::new(MemoryAssetStore::empty());
        let resolver = Arc::new(Resolver::new(store.clone(), assets));
        Dispatcher::new(JobContext::new(store, resolver, EventBus::new()))
    }

    #[test]
    fn test_subject_parse() {
        assert_eq!(Subject::parse("CREATE"), Some(Subject::Create));
        assert_eq!(Subject::parse("resolve"), Some(Subject::Resolve));
        assert_eq!(Subject::parse("PURGE"), None);
    }

    #[test]
    fn test_unknown_subject() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir);
        let reply = d.respond("PURGE", b"{}");
        assert!(!reply.is_ok());
        assert_eq!(reply.error.as_deref(), Some("Unsupported subject 'PURGE'"));
    }

    #[test]
    fn test_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir);
        assert_eq!(
            d.handle("READ", b"  ").unwrap_err().to_string(),
            "Wrong input data: payload is empty"
        );
        assert_eq!(
            d.handle("READ", b"{\"oops\"").unwrap_err().to_string(),
            "Wrong input data: format of payload is incorrect"
        );
    }

    #[test]
    fn test_list_ignores_payload() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir);
        assert_eq!(d.handle("LIST", b"").unwrap(), json!([]));
    }

    #[test]
    fn test_delete_input_shapes() {
        assert_eq!(
            serde_json::from_value::<IdList>(json!(3)).unwrap().into_vec(),
            vec![3]
        );
        assert_eq!(
            serde_json::from_value::<IdList>(json!([1, 2])).unwrap().into_vec(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_envelope_json() {
        let ok = Response::ok("LIST", json!([]));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "ok", "subject": "LIST", "out": []})
        );
        let err = Response::error("READ", &GroupError::not_found("Group with id '9' was not found"));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "error", "subject": "READ", "error": "Group with id '9' was not found"})
        );
    }
}
