//! Core data types for tasks and their sync metadata.
//!
//! Tasks form a forest through `parent_id`. Everything the sync engine
//! round-trips through a remote item body lives here, as does the metadata
//! map where each remote integration records its own pointer block.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work in the local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique, immutable id (UUIDv4).
    pub id: String,
    /// Local id of the parent task, if this is a subtask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Small integer priority, 1 is the default/lowest.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub completed: bool,
    /// Outcome text, set only when the task is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Ids of tasks this task is waiting on. Inverse of `blocks`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    /// Ids of tasks waiting on this task. Inverse of `blocked_by`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

fn default_priority() -> u8 {
    1
}

impl Task {
    /// Create a new pending task with fresh timestamps.
    pub fn new(name: impl Into<String>, description: impl Into<String>, priority: u8, parent_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id,
            name: name.into(),
            description: description.into(),
            priority,
            completed: false,
            result: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            metadata: TaskMetadata::default(),
        }
    }

    /// Lifecycle status derived from the completion and start fields.
    pub fn status(&self) -> TaskStatus {
        if self.completed {
            TaskStatus::Completed
        } else if self.started_at.is_some() {
            TaskStatus::InProgress
        } else {
            TaskStatus::Pending
        }
    }
}

/// Lifecycle status of a task, reflected in the remote status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Stable name used in status labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

/// Open metadata map attached to each task.
///
/// Each remote integration owns exactly one block here (`github`,
/// `shortcut`) and is the only writer of that block; everything else treats
/// it as opaque. Unknown blocks from older or newer versions survive a
/// load/save cycle through the flattened map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<RemoteLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<RemoteLink>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TaskMetadata {
    /// Look up a remote integration's pointer block by its metadata key.
    pub fn remote_link(&self, key: &str) -> Option<&RemoteLink> {
        match key {
            "github" => self.github.as_ref(),
            "shortcut" => self.shortcut.as_ref(),
            _ => None,
        }
    }

    /// Replace a remote integration's pointer block.
    pub fn set_remote_link(&mut self, key: &str, link: RemoteLink) {
        match key {
            "github" => self.github = Some(link),
            "shortcut" => self.shortcut = Some(link),
            other => {
                if let Ok(value) = serde_json::to_value(&link) {
                    self.extra.insert(other.to_string(), value);
                }
            }
        }
    }
}

/// Reference to the commit that realized a task's work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl CommitRef {
    /// Abbreviated sha used in messages. The sha can arrive from a remote
    /// body and is not guaranteed to be hex, so truncation goes by chars.
    pub fn short_sha(&self) -> &str {
        match self.sha.char_indices().nth(8) {
            Some((end, _)) => &self.sha[..end],
            None => &self.sha,
        }
    }
}

/// One remote integration's pointer to the item mirroring a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLink {
    pub id: String,
    pub url: String,
    /// Last state this integration recorded for the item: "open" or "closed".
    pub state: String,
}

impl RemoteLink {
    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }
}

/// A task seen through a tree walk: depth in edges from the walk's root,
/// and the local id of the immediate parent (`None` at depth 0).
#[derive(Debug, Clone)]
pub struct HierarchicalTask {
    pub task: Task,
    pub depth: usize,
    pub parent_id: Option<String>,
}

/// Partial update pulled from a newer remote copy, applied verbatim by the
/// store. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub task_id: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub commit: Option<CommitRef>,
}

impl TaskPatch {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Default::default()
        }
    }

    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.updated_at.is_none()
            && self.completed.is_none()
            && self.completed_at.is_none()
            && self.started_at.is_none()
            && self.result.is_none()
            && self.commit.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::CommitRef;

    fn commit(sha: &str) -> CommitRef {
        CommitRef {
            sha: sha.to_string(),
            message: None,
            branch: None,
            url: None,
            time: None,
        }
    }

    #[test]
    fn short_sha_truncates_on_char_boundaries() {
        assert_eq!(commit("0123456789abcdef").short_sha(), "01234567");
        assert_eq!(commit("abc").short_sha(), "abc");
        assert_eq!(commit("").short_sha(), "");
        // Shas pulled from remote bodies are arbitrary strings.
        assert_eq!(commit("aaaaaaa✓bbb").short_sha(), "aaaaaaa✓");
    }
}
