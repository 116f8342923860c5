use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use tempfile::TempDir;

use taskmirror::codec::body;
use taskmirror::git::CommitVerifier;
use taskmirror::model::{CommitRef, RemoteLink, Task};
use taskmirror::remote::engine::SyncEngine;
use taskmirror::remote::github::GITHUB_PROFILE;
use taskmirror::remote::labels::LabelScheme;
use taskmirror::remote::shortcut::SHORTCUT_PROFILE;
use taskmirror::remote::{
    ItemPage, ItemPatch, ItemState, NewItem, RemoteError, RemoteItem, RemoteItems, ServiceProfile, SyncProgress,
};
use taskmirror::store::TaskStore;

#[derive(Default)]
struct MockState {
    items: HashMap<String, RemoteItem>,
    calls: Vec<String>,
    next_id: u64,
}

/// Scripted in-memory remote that records every call.
#[derive(Clone)]
struct MockRemote {
    state: Arc<Mutex<MockState>>,
    scheme: LabelScheme,
}

impl MockRemote {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_id: 100,
                ..Default::default()
            })),
            scheme: LabelScheme::new("taskmirror"),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn item(&self, id: &str) -> Option<RemoteItem> {
        self.state.lock().unwrap().items.get(id).cloned()
    }

    fn items(&self) -> Vec<RemoteItem> {
        self.state.lock().unwrap().items.values().cloned().collect()
    }

    fn seed(&self, id: &str, title: &str, body: &str, labels: &[&str], state: ItemState) {
        let all_labels: Vec<String> = labels.iter().map(|label| label.to_string()).collect();
        let item = RemoteItem {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            state,
            sync_labels: self.scheme.sync_subset(&all_labels).into_iter().collect(),
            all_labels,
            url: format!("https://remote.example/items/{}", id),
            is_pull_request: false,
        };
        self.state.lock().unwrap().items.insert(id.to_string(), item);
    }
}

#[async_trait]
impl RemoteItems for MockRemote {
    async fn list_items_by_label(&self, _label: &str, _page: Option<&str>) -> Result<ItemPage, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list".to_string());
        Ok(ItemPage {
            items: state.items.values().cloned().collect(),
            next_page: None,
        })
    }

    async fn get_item(&self, id: &str) -> Result<RemoteItem, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {}", id));
        state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn create_item(&self, item: NewItem) -> Result<RemoteItem, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create".to_string());
        state.next_id += 1;
        let id = state.next_id.to_string();
        let created = RemoteItem {
            id: id.clone(),
            title: item.title,
            body: item.body,
            state: ItemState::Open,
            sync_labels: self.scheme.sync_subset(&item.labels).into_iter().collect(),
            all_labels: item.labels,
            url: format!("https://remote.example/items/{}", id),
            is_pull_request: false,
        };
        state.items.insert(id, created.clone());
        Ok(created)
    }

    async fn update_item(&self, id: &str, patch: ItemPatch) -> Result<RemoteItem, RemoteError> {
        let mut state = self.state.lock().unwrap();
        let state_arg = patch.state.map(|s| s.as_str()).unwrap_or("omitted");
        state.calls.push(format!("update {} state={}", id, state_arg));
        let scheme = self.scheme.clone();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        if let Some(title) = patch.title {
            item.title = title;
        }
        if let Some(body) = patch.body {
            item.body = body;
        }
        if let Some(labels) = patch.labels {
            item.sync_labels = scheme.sync_subset(&labels).into_iter().collect();
            item.all_labels = labels;
        }
        if let Some(new_state) = patch.state {
            item.state = new_state;
        }
        Ok(item.clone())
    }

    async fn create_comment(&self, id: &str, _body: &str) -> Result<(), RemoteError> {
        self.state.lock().unwrap().calls.push(format!("comment {}", id));
        Ok(())
    }

    fn item_url(&self, id: &str) -> String {
        format!("https://remote.example/items/{}", id)
    }
}

struct MockVerifier {
    on_branch: HashSet<String>,
}

impl MockVerifier {
    fn with(shas: &[&str]) -> Self {
        Self {
            on_branch: shas.iter().map(|sha| sha.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CommitVerifier for MockVerifier {
    async fn is_commit_on_default_branch(&self, sha: &str) -> anyhow::Result<bool> {
        Ok(self.on_branch.contains(sha))
    }
}

fn engine(mock: &MockRemote, verifier: MockVerifier, profile: ServiceProfile) -> SyncEngine {
    SyncEngine::new(
        Box::new(mock.clone()),
        Box::new(verifier),
        LabelScheme::new("taskmirror"),
        profile,
    )
}

fn new_store(dir: &TempDir) -> TaskStore {
    TaskStore::load(dir.path().join("tasks.json")).unwrap()
}

fn commit(sha: &str) -> CommitRef {
    CommitRef {
        sha: sha.to_string(),
        message: None,
        branch: None,
        url: None,
        time: None,
    }
}

#[tokio::test]
async fn test_completed_task_without_commit_creates_open_item() {
    let dir = TempDir::new().unwrap();
    let mut store = new_store(&dir);
    let task = store.add_task("Finish report", "Write it up", 1, None).unwrap();
    store.complete(&task.id, Some("wrote it".to_string()), None).unwrap();

    let mock = MockRemote::new();
    let mut engine = engine(&mock, MockVerifier::with(&[]), GITHUB_PROFILE);
    let mut progress = |_: SyncProgress<'_>| {};
    let results = engine.sync_all(&store, &mut progress).await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.created);
    assert_eq!(
        result.not_closing_reason.as_deref(),
        Some("completed without commit reference")
    );
    let link = result.remote.as_ref().unwrap();
    assert_eq!(link.state, "open");

    let item = mock.item(&link.id).unwrap();
    assert_eq!(item.state, ItemState::Open);
    assert!(item.all_labels.contains(&"taskmirror".to_string()));
    assert!(item.all_labels.contains(&"taskmirror:p1".to_string()));
    assert!(item.all_labels.contains(&"taskmirror:status:completed".to_string()));
    // One warm, one create; no state update, no comment.
    assert_eq!(mock.calls(), vec!["list", "create"]);
}

#[tokio::test]
async fn test_fast_path_skips_with_zero_remote_calls() {
    let dir = TempDir::new().unwrap();
    let mut store = new_store(&dir);
    let task = store.add_task("Done and closed", "", 1, None).unwrap();
    store.complete(&task.id, None, Some(commit("aaa"))).unwrap();
    store
        .record_sync(
            &task.id,
            "github",
            RemoteLink {
                id: "7".to_string(),
                url: "https://remote.example/items/7".to_string(),
                state: "closed".to_string(),
            },
        )
        .unwrap();

    let mock = MockRemote::new();
    let mut engine = engine(&mock, MockVerifier::with(&["aaa"]), GITHUB_PROFILE);
    let mut progress = |_: SyncProgress<'_>| {};
    let result = engine.sync_task(&store, &task.id, &mut progress).await.unwrap().unwrap();

    assert!(result.skipped);
    assert_eq!(result.remote.as_ref().unwrap().id, "7");
    assert!(mock.calls().is_empty(), "fast path must not touch the API: {:?}", mock.calls());
}

#[tokio::test]
async fn test_externally_closed_item_is_never_reopened() {
    let dir = TempDir::new().unwrap();
    let mut store = new_store(&dir);
    let task = store.add_task("Renamed task", "body", 1, None).unwrap();

    // Remote body rendered from an older copy so the remote is not newer.
    let mut older = task.clone();
    older.updated_at = task.updated_at - Duration::hours(1);
    older.name = "Original name".to_string();
    let remote_body = body::render_document(&older, None, &[]);
    let mock = MockRemote::new();
    mock.seed("5", "Original name", &remote_body, &["taskmirror"], ItemState::Closed);

    // Stale local metadata still claims the item is open.
    store
        .record_sync(
            &task.id,
            "github",
            RemoteLink {
                id: "5".to_string(),
                url: "https://remote.example/items/5".to_string(),
                state: "open".to_string(),
            },
        )
        .unwrap();

    let mut engine = engine(&mock, MockVerifier::with(&[]), GITHUB_PROFILE);
    let mut progress = |_: SyncProgress<'_>| {};
    let result = engine.sync_task(&store, &task.id, &mut progress).await.unwrap().unwrap();

    // Content was pushed but the state field stayed out of the payload.
    assert!(mock.calls().contains(&"update 5 state=omitted".to_string()), "calls: {:?}", mock.calls());
    assert_eq!(mock.item("5").unwrap().state, ItemState::Closed);
    assert_eq!(result.remote.as_ref().unwrap().state, "closed");
}

#[tokio::test]
async fn test_second_run_skips_unchanged_item() {
    let dir = TempDir::new().unwrap();
    let mut store = new_store(&dir);
    let task = store.add_task("Stable task", "no changes", 2, None).unwrap();

    let mock = MockRemote::new();
    let mut progress = |_: SyncProgress<'_>| {};

    let mut first = engine(&mock, MockVerifier::with(&[]), GITHUB_PROFILE);
    let results = first.sync_all(&store, &mut progress).await.unwrap();
    assert!(results[0].created);
    store
        .record_sync(&task.id, "github", results[0].remote.clone().unwrap())
        .unwrap();
    mock.clear_calls();

    // Recording sync metadata must not make the task look edited.
    let mut second = engine(&mock, MockVerifier::with(&[]), GITHUB_PROFILE);
    let results = second.sync_all(&store, &mut progress).await.unwrap();
    assert!(results[0].skipped);
    assert_eq!(mock.calls(), vec!["list"]);
}

#[tokio::test]
async fn test_remote_newer_pulls_instead_of_pushing() {
    let dir = TempDir::new().unwrap();
    let mut store = new_store(&dir);
    let task = store.add_task("Edited remotely", "local body", 1, None).unwrap();

    let mut newer = task.clone();
    newer.updated_at = task.updated_at + Duration::hours(2);
    newer.completed = true;
    newer.completed_at = Some(newer.updated_at);
    newer.result = Some("closed on the remote".to_string());
    let remote_body = body::render_document(&newer, None, &[]);
    let mock = MockRemote::new();
    mock.seed("9", "Edited remotely", &remote_body, &["taskmirror"], ItemState::Closed);

    let mut engine = engine(&mock, MockVerifier::with(&[]), GITHUB_PROFILE);
    let mut progress = |_: SyncProgress<'_>| {};
    let results = engine.sync_all(&store, &mut progress).await.unwrap();

    let result = &results[0];
    assert!(result.pulled_from_remote);
    assert!(!result.patches.is_empty());
    let patch = &result.patches[0];
    assert_eq!(patch.task_id, task.id);
    assert_eq!(patch.updated_at, Some(newer.updated_at));
    assert_eq!(patch.completed, Some(true));

    let calls = mock.calls();
    assert!(!calls.iter().any(|call| call.starts_with("update")), "no push on pull: {:?}", calls);
    assert!(!calls.contains(&"create".to_string()));

    // The caller applies the patch and the stores converge.
    store.apply_patch(patch).unwrap();
    let local = store.get(&task.id).unwrap();
    assert!(local.completed);
    assert_eq!(local.updated_at, newer.updated_at);
}

#[tokio::test]
async fn test_orphaned_task_produces_no_result() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.json");
    let root = Task::new("A real root", "", 1, None);
    let mut orphan = Task::new("Orphan", "", 1, None);
    orphan.parent_id = Some("no-such-parent".to_string());
    std::fs::write(&path, serde_json::to_string(&vec![root.clone(), orphan.clone()]).unwrap()).unwrap();
    let store = TaskStore::load(&path).unwrap();

    let mock = MockRemote::new();
    let mut engine = engine(&mock, MockVerifier::with(&[]), GITHUB_PROFILE);
    let mut progress = |_: SyncProgress<'_>| {};

    let results = engine.sync_all(&store, &mut progress).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].task_id, root.id);

    let from_single = engine.sync_task(&store, &orphan.id, &mut progress).await.unwrap();
    assert!(from_single.is_none());
}

#[tokio::test]
async fn test_link_strategy_syncs_descendants_as_items() {
    let dir = TempDir::new().unwrap();
    let mut store = new_store(&dir);
    let parent = store.add_task("Parent story", "parent body", 1, None).unwrap();
    let child = store
        .add_task("Child story", "child body", 1, Some(parent.id.clone()))
        .unwrap();

    let mock = MockRemote::new();
    let mut engine = engine(&mock, MockVerifier::with(&[]), SHORTCUT_PROFILE);
    let mut progress = |_: SyncProgress<'_>| {};
    let results = engine.sync_all(&store, &mut progress).await.unwrap();

    let result = &results[0];
    assert!(result.created);
    assert_eq!(result.descendants.len(), 1);
    assert!(result.descendants[0].created);
    assert_eq!(result.descendants[0].task_id, child.id);

    // Two separate items; the child carries a parent marker, and the
    // parent's own body embeds nothing.
    let items = mock.items();
    assert_eq!(items.len(), 2);
    let child_item = items
        .iter()
        .find(|item| body::extract_task_id(&item.body).as_deref() == Some(child.id.as_str()))
        .unwrap();
    let parsed = body::parse_document(&child_item.body);
    assert_eq!(parsed.root.parent_id.as_deref(), Some(parent.id.as_str()));

    let parent_item = items
        .iter()
        .find(|item| body::extract_task_id(&item.body).as_deref() == Some(parent.id.as_str()))
        .unwrap();
    assert!(!parent_item.body.contains("## Subtasks"));
}

#[tokio::test]
async fn test_closing_posts_result_comment() {
    let dir = TempDir::new().unwrap();
    let mut store = new_store(&dir);
    let task = store.add_task("Verified work", "", 1, None).unwrap();
    store
        .complete(&task.id, Some("All tests green".to_string()), Some(commit("cafe")))
        .unwrap();

    let mock = MockRemote::new();
    let mut engine = engine(&mock, MockVerifier::with(&["cafe"]), GITHUB_PROFILE);
    let mut progress = |_: SyncProgress<'_>| {};
    let results = engine.sync_all(&store, &mut progress).await.unwrap();

    let link = results[0].remote.as_ref().unwrap();
    assert_eq!(link.state, "closed");
    assert!(results[0].not_closing_reason.is_none());
    assert_eq!(mock.item(&link.id).unwrap().state, ItemState::Closed);

    let calls = mock.calls();
    assert!(calls.contains(&format!("update {} state=closed", link.id)));
    assert!(calls.contains(&format!("comment {}", link.id)));
}
