//! Label scheme shared by both remote integrations.
//!
//! Every mirrored item carries the sync label itself plus prefixed
//! priority and status labels. Only labels under the sync prefix are ever
//! compared or rewritten; anything else on the item belongs to humans and
//! is passed back untouched.

use std::collections::BTreeSet;

use crate::model::Task;

/// Computes and classifies sync-owned labels for one sync label.
#[derive(Debug, Clone)]
pub struct LabelScheme {
    sync_label: String,
}

impl LabelScheme {
    pub fn new(sync_label: impl Into<String>) -> Self {
        Self {
            sync_label: sync_label.into(),
        }
    }

    pub fn sync_label(&self) -> &str {
        &self.sync_label
    }

    /// Whether a label belongs to the sync scheme: the sync label itself or
    /// anything under its prefix.
    pub fn is_sync_label(&self, label: &str) -> bool {
        label == self.sync_label || label.starts_with(&format!("{}:", self.sync_label))
    }

    /// The full label set a task's remote item should carry.
    pub fn expected(&self, task: &Task) -> Vec<String> {
        vec![
            self.sync_label.clone(),
            format!("{}:p{}", self.sync_label, task.priority),
            format!("{}:status:{}", self.sync_label, task.status().as_str()),
        ]
    }

    /// Expected labels plus every non-sync label already on the item.
    pub fn merge(&self, expected: &[String], existing: &[String]) -> Vec<String> {
        let mut out: Vec<String> = expected.to_vec();
        for label in existing {
            if !self.is_sync_label(label) && !out.contains(label) {
                out.push(label.clone());
            }
        }
        out
    }

    /// The sync-owned subset of a label list, as an unordered set.
    pub fn sync_subset(&self, labels: &[String]) -> BTreeSet<String> {
        labels.iter().filter(|label| self.is_sync_label(label)).cloned().collect()
    }
}
