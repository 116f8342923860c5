//! Change detection between a remote item and its expected rendering.
//!
//! Pure comparison of four values. Callers differ only in where `actual`
//! came from (cache or a direct fetch); the verdict is identical either
//! way.

use crate::remote::labels::LabelScheme;
use crate::remote::{ItemState, RemoteItem};

/// What the remote item should look like after this pass.
#[derive(Debug, Clone)]
pub struct ExpectedItem<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub labels: &'a [String],
    pub state: ItemState,
}

/// True when an update call is worth spending: title differs, body differs
/// after trimming, open/closed state differs, or the sync-owned label set
/// differs as an unordered set. Labels outside the sync prefix are never
/// part of the comparison.
pub fn needs_update(scheme: &LabelScheme, actual: &RemoteItem, expected: &ExpectedItem<'_>) -> bool {
    if actual.title != expected.title {
        return true;
    }
    if actual.body.trim() != expected.body.trim() {
        return true;
    }
    if actual.state != expected.state {
        return true;
    }
    scheme.sync_subset(&actual.all_labels) != scheme.sync_subset(expected.labels)
}
