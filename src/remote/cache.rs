//! Per-run cache of remote items, indexed by embedded task id.
//!
//! Warmed once with a single paginated fetch of everything carrying the
//! sync label. Warming fails soft: a failed fetch logs a warning and
//! leaves the cache in the `Failed` state, and the orchestrator falls back
//! to per-task API calls. The cache is an optimization, never a
//! correctness requirement.

use std::collections::HashMap;

use log::{debug, warn};

use crate::codec::body;
use crate::remote::{RemoteItem, RemoteItems};

/// Whether a cache miss is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never warmed; a miss means nothing.
    Cold,
    /// Warmed successfully; a miss means no labeled item embeds that id.
    Warm,
    /// Warming failed; treated as empty, misses mean nothing.
    Failed,
}

/// One sync run's view of the labeled remote items.
pub struct RemoteCache {
    state: CacheState,
    items: HashMap<String, RemoteItem>,
}

impl RemoteCache {
    pub fn new() -> Self {
        Self {
            state: CacheState::Cold,
            items: HashMap::new(),
        }
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn is_warm(&self) -> bool {
        self.state == CacheState::Warm
    }

    pub fn get(&self, task_id: &str) -> Option<&RemoteItem> {
        self.items.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fetch every item carrying `label`, page by page, and index by the
    /// task id embedded in each body. Pull/merge requests and items with
    /// no extractable id are skipped.
    pub async fn warm(&mut self, client: &dyn RemoteItems, label: &str) {
        self.items.clear();
        let mut page_token: Option<String> = None;
        let mut seen = 0usize;

        loop {
            let page = match client.list_items_by_label(label, page_token.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    warn!("Remote cache warm failed, falling back to per-task lookups: {}", err);
                    self.items.clear();
                    self.state = CacheState::Failed;
                    return;
                }
            };

            for item in page.items {
                seen += 1;
                if item.is_pull_request {
                    continue;
                }
                match body::extract_task_id(&item.body) {
                    Some(task_id) => {
                        self.items.insert(task_id, item);
                    }
                    None => {
                        debug!("Remote item {} carries label '{}' but embeds no task id", item.id, label);
                    }
                }
            }

            match page.next_page {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!("Remote cache warmed: {} of {} labeled items indexed", self.items.len(), seen);
        self.state = CacheState::Warm;
    }
}

impl Default for RemoteCache {
    fn default() -> Self {
        Self::new()
    }
}
