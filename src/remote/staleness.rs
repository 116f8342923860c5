//! Staleness reconciliation: pull instead of push when the remote copy is
//! newer.
//!
//! The remote document embeds an `updated_at` marker per task. When any of
//! them is strictly later than the matching local task's `updated_at`, the
//! push for this pass is withheld and a patch per stale task is proposed
//! for the caller to apply to the local store.

use crate::codec::body::{ParsedDocument, ParsedTask};
use crate::model::{HierarchicalTask, Task, TaskPatch};

/// Outcome of comparing a local tree against the parsed remote document.
#[derive(Debug, Clone, Default)]
pub struct StalenessCheck {
    /// The remote copy is newer somewhere; do not push this pass.
    pub stale: bool,
    /// One patch per stale task.
    pub patches: Vec<TaskPatch>,
}

/// Compare the local root and descendants against the remote document.
///
/// Tasks present locally but absent from the remote body (or vice versa)
/// are ignored here; only matched pairs can be stale.
pub fn check(root: &Task, descendants: &[HierarchicalTask], doc: &ParsedDocument) -> StalenessCheck {
    let mut result = StalenessCheck::default();

    if let Some(patch) = task_patch(root, &doc.root) {
        result.patches.push(patch);
    }
    for descendant in descendants {
        if let Some(parsed) = doc.descendants.iter().find(|parsed| parsed.id == descendant.task.id) {
            if let Some(patch) = task_patch(&descendant.task, parsed) {
                result.patches.push(patch);
            }
        }
    }

    result.stale = !result.patches.is_empty();
    result
}

/// Patch for one local task whose remote copy is strictly newer, `None`
/// otherwise.
///
/// The patch always carries the remote `updated_at`; completion fields
/// travel only when the remote is completed and the local copy is not, and
/// a remote commit reference only when the local task has none.
fn task_patch(local: &Task, remote: &ParsedTask) -> Option<TaskPatch> {
    let remote_updated = remote.updated_at?;
    if remote_updated <= local.updated_at {
        return None;
    }

    let mut patch = TaskPatch::new(&local.id);
    patch.updated_at = Some(remote_updated);
    if remote.completed && !local.completed {
        patch.completed = Some(true);
        patch.completed_at = remote.completed_at;
        patch.started_at = remote.started_at;
        patch.result = remote.result.clone();
    }
    if local.metadata.commit.is_none() {
        if let Some(commit) = &remote.commit {
            patch.commit = Some(commit.clone());
        }
    }
    Some(patch)
}
