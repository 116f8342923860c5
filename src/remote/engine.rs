//! The sync orchestrator.
//!
//! Per task the engine runs: locate (recorded pointer → cache → bulk
//! id-search) → staleness check (pull and stop when the remote is newer) →
//! fast path (expected-closed and already recorded closed means skip
//! without touching the API) → change detection → create or update.
//! Closing always travels inside the create/update flow, never as a
//! separate call, and an update never reopens an externally closed item.
//!
//! One engine instance is built per sync invocation and owns its own
//! cache; there is no shared state between runs.

use anyhow::Result;
use log::{debug, info, warn};

use crate::codec::body;
use crate::git::CommitVerifier;
use crate::model::{HierarchicalTask, RemoteLink, Task};
use crate::remote::cache::RemoteCache;
use crate::remote::diff::{self, ExpectedItem};
use crate::remote::gate::{CloseVerdict, CompletionGate};
use crate::remote::labels::LabelScheme;
use crate::remote::staleness;
use crate::remote::{
    DescendantStrategy, ItemPatch, ItemState, NewItem, ProgressFn, RemoteError, RemoteItem, RemoteItems,
    ServiceProfile, SyncPhase, SyncProgress, SyncResult,
};
use crate::store::{TaskForest, TaskStore};

/// Orchestrates one service's sync runs. Construct one per invocation.
pub struct SyncEngine {
    client: Box<dyn RemoteItems>,
    verifier: Box<dyn CommitVerifier>,
    scheme: LabelScheme,
    profile: ServiceProfile,
    cache: RemoteCache,
}

impl SyncEngine {
    pub fn new(
        client: Box<dyn RemoteItems>,
        verifier: Box<dyn CommitVerifier>,
        scheme: LabelScheme,
        profile: ServiceProfile,
    ) -> Self {
        Self {
            client,
            verifier,
            scheme,
            profile,
            cache: RemoteCache::new(),
        }
    }

    pub fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    /// Sync every top-level task sequentially. The cache is warmed exactly
    /// once, before the loop; an error on any task aborts the rest of the
    /// batch.
    pub async fn sync_all(&mut self, store: &TaskStore, progress: &mut ProgressFn<'_>) -> Result<Vec<SyncResult>> {
        let forest = store.forest();
        for orphan in forest.orphans() {
            warn!("Skipping orphaned task {}: parent not found", orphan);
        }

        self.cache.warm(self.client.as_ref(), self.scheme.sync_label()).await;

        let roots = forest.roots();
        info!("Syncing {} top-level tasks to {}", roots.len(), self.profile.display_name);

        let mut results = Vec::with_capacity(roots.len());
        for root in roots {
            let result = self.sync_tree(root, &forest, progress).await?;
            results.push(result);
        }
        Ok(results)
    }

    /// Sync one task's tree. A subtask id resolves to its top-level
    /// ancestor; a broken parent chain yields `None`.
    pub async fn sync_task(
        &mut self,
        store: &TaskStore,
        task_id: &str,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Option<SyncResult>> {
        let forest = store.forest();
        if forest.get(task_id).is_none() {
            anyhow::bail!("Task '{}' not found", task_id);
        }
        let Some(root) = forest.root_of(task_id) else {
            warn!("Task {} belongs to an orphaned subtree; not syncing", task_id);
            return Ok(None);
        };
        let result = self.sync_tree(root, &forest, progress).await?;
        Ok(Some(result))
    }

    async fn sync_tree(&mut self, root: &Task, forest: &TaskForest, progress: &mut ProgressFn<'_>) -> Result<SyncResult> {
        let descendants = forest.descendants(&root.id);
        let embedded: Vec<HierarchicalTask> = match self.profile.descendants {
            DescendantStrategy::Embed => descendants.clone(),
            DescendantStrategy::Link => Vec::new(),
        };

        let mut result = self.sync_item(root, None, &embedded, forest, progress).await?;

        // Services that cannot embed descendants get a second pass where
        // each descendant becomes its own linked item.
        if self.profile.descendants == DescendantStrategy::Link && !result.pulled_from_remote {
            for entry in &descendants {
                let sub = self.sync_item(&entry.task, entry.parent_id.as_deref(), &[], forest, progress).await?;
                result.descendants.push(sub);
            }
        }
        Ok(result)
    }

    /// The per-item state machine.
    async fn sync_item(
        &mut self,
        task: &Task,
        parent_id: Option<&str>,
        embedded: &[HierarchicalTask],
        forest: &TaskForest,
        progress: &mut ProgressFn<'_>,
    ) -> Result<SyncResult> {
        progress(SyncProgress {
            task_id: &task.id,
            task_name: &task.name,
            phase: SyncPhase::Checking,
        });

        let gate = CompletionGate::new(self.verifier.as_ref());
        let CloseVerdict { eligible, reason } = gate.verdict(task, forest).await;
        let not_closing_reason = if task.completed && !eligible { reason } else { None };
        let recorded = task.metadata.remote_link(self.profile.metadata_key).cloned();

        // Locate, cheapest source first.
        let mut item = self.cache.get(&task.id).cloned();

        // Staleness on the cached body costs nothing extra.
        if let Some(found) = &item {
            if let Some(pull) = self.check_staleness(task, embedded, found) {
                return Ok(pull);
            }
        }

        // Fast path: expected-closed and this service already recorded the
        // item closed. Nothing to do, and when the item is not cached this
        // costs zero remote calls.
        if eligible {
            if let Some(link) = &recorded {
                if link.is_closed() {
                    debug!("Task {} already closed on {}; fast-path skip", task.id, self.profile.display_name);
                    progress(SyncProgress {
                        task_id: &task.id,
                        task_name: &task.name,
                        phase: SyncPhase::Skipped,
                    });
                    return Ok(SyncResult {
                        task_id: task.id.clone(),
                        remote: Some(link.clone()),
                        skipped: true,
                        ..Default::default()
                    });
                }
            }
        }

        // Cache miss: try the recorded pointer, then the bulk id search.
        if item.is_none() {
            if let Some(link) = &recorded {
                match self.client.get_item(&link.id).await {
                    Ok(found) => {
                        if let Some(pull) = self.check_staleness(task, embedded, &found) {
                            return Ok(pull);
                        }
                        item = Some(found);
                    }
                    Err(RemoteError::NotFound(_)) => {
                        warn!(
                            "Recorded {} item {} for task {} is gone; recreating",
                            self.profile.display_name, link.id, task.id
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            } else if !self.cache.is_warm() {
                self.cache.warm(self.client.as_ref(), self.scheme.sync_label()).await;
                if let Some(found) = self.cache.get(&task.id).cloned() {
                    if let Some(pull) = self.check_staleness(task, embedded, &found) {
                        return Ok(pull);
                    }
                    item = Some(found);
                }
            }
        }

        let expected_body = body::render_document(task, parent_id, embedded);
        let expected_labels = self.scheme.expected(task);

        let mut result = match item {
            None => {
                self.create(task, expected_body, expected_labels, eligible, progress)
                    .await?
            }
            Some(item) => {
                self.update(task, item, expected_body, expected_labels, eligible, progress)
                    .await?
            }
        };
        result.not_closing_reason = not_closing_reason;
        Ok(result)
    }

    fn check_staleness(&self, task: &Task, embedded: &[HierarchicalTask], item: &RemoteItem) -> Option<SyncResult> {
        let doc = body::parse_document(&item.body);
        let check = staleness::check(task, embedded, &doc);
        if !check.stale {
            return None;
        }
        info!(
            "Remote copy of task {} is newer than local; pulling {} patch(es) instead of pushing",
            task.id,
            check.patches.len()
        );
        Some(SyncResult {
            task_id: task.id.clone(),
            remote: Some(RemoteLink {
                id: item.id.clone(),
                url: item.url.clone(),
                state: item.state.as_str().to_string(),
            }),
            pulled_from_remote: true,
            patches: check.patches,
            ..Default::default()
        })
    }

    async fn create(
        &self,
        task: &Task,
        body: String,
        labels: Vec<String>,
        close: bool,
        progress: &mut ProgressFn<'_>,
    ) -> Result<SyncResult> {
        progress(SyncProgress {
            task_id: &task.id,
            task_name: &task.name,
            phase: SyncPhase::Creating,
        });

        let created = self
            .client
            .create_item(NewItem {
                title: task.name.clone(),
                body,
                labels,
            })
            .await?;
        info!("Created {} item {} for task {}", self.profile.display_name, created.id, task.id);

        // Creation yields an open item; the close rides a follow-up update
        // in the same flow.
        let mut state = ItemState::Open;
        if close {
            self.client
                .update_item(
                    &created.id,
                    ItemPatch {
                        state: Some(ItemState::Closed),
                        ..Default::default()
                    },
                )
                .await?;
            if let Some(text) = &task.result {
                self.client.create_comment(&created.id, text).await?;
            }
            state = ItemState::Closed;
        }

        Ok(SyncResult {
            task_id: task.id.clone(),
            remote: Some(RemoteLink {
                id: created.id.clone(),
                url: created.url.clone(),
                state: state.as_str().to_string(),
            }),
            created: true,
            ..Default::default()
        })
    }

    async fn update(
        &self,
        task: &Task,
        item: RemoteItem,
        expected_body: String,
        expected_labels: Vec<String>,
        close: bool,
        progress: &mut ProgressFn<'_>,
    ) -> Result<SyncResult> {
        let merged_labels = self.scheme.merge(&expected_labels, &item.all_labels);
        // Never force a closed item back open: the expected state is only
        // ever "what it is" or "closed".
        let expected_state = if close { ItemState::Closed } else { item.state };

        let expected = ExpectedItem {
            title: &task.name,
            body: &expected_body,
            labels: &merged_labels,
            state: expected_state,
        };
        if !diff::needs_update(&self.scheme, &item, &expected) {
            debug!("Task {} unchanged on {}; skipping", task.id, self.profile.display_name);
            progress(SyncProgress {
                task_id: &task.id,
                task_name: &task.name,
                phase: SyncPhase::Skipped,
            });
            return Ok(SyncResult {
                task_id: task.id.clone(),
                remote: Some(RemoteLink {
                    id: item.id.clone(),
                    url: item.url.clone(),
                    state: item.state.as_str().to_string(),
                }),
                skipped: true,
                ..Default::default()
            });
        }

        progress(SyncProgress {
            task_id: &task.id,
            task_name: &task.name,
            phase: SyncPhase::Updating,
        });

        let closing = close && item.state == ItemState::Open;
        self.client
            .update_item(
                &item.id,
                ItemPatch {
                    title: Some(task.name.clone()),
                    body: Some(expected_body),
                    labels: Some(merged_labels),
                    // Omitted unless transitioning to closed.
                    state: closing.then_some(ItemState::Closed),
                },
            )
            .await?;
        info!("Updated {} item {} for task {}", self.profile.display_name, item.id, task.id);

        if closing {
            if let Some(text) = &task.result {
                self.client.create_comment(&item.id, text).await?;
            }
        }

        Ok(SyncResult {
            task_id: task.id.clone(),
            remote: Some(RemoteLink {
                id: item.id.clone(),
                url: item.url.clone(),
                state: expected_state.as_str().to_string(),
            }),
            ..Default::default()
        })
    }
}
