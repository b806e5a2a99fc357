use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSubject {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "UPDATED")]
    Updated,
    #[serde(rename = "DELETED")]
    Deleted,
}

impl EventSubject {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSubject::Created => "CREATED",
            EventSubject::Updated => "UPDATED",
            EventSubject::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification about a changed group; the payload is the group id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEvent {
    pub subject: EventSubject,
    pub id: u64,
}

/// Fire-and-forget notification channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GroupEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.tx.subscribe()
    }

    /// Publish without waiting. Failures are logged and never reach the caller.
    pub fn publish(&self, subject: EventSubject, id: u64) {
        match self.tx.send(GroupEvent { subject, id }) {
            Ok(receivers) => {
                tracing::debug!(subject = %subject, id, receivers, "Group event published")
            }
            Err(_) => {
                tracing::warn!(subject = %subject, id, "Group event dropped, no subscriber")
            }
        }
    }
}
