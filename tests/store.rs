use tempfile::TempDir;

use taskmirror::model::{CommitRef, RemoteLink, TaskPatch};
use taskmirror::store::TaskStore;

fn open_store(dir: &TempDir) -> TaskStore {
    TaskStore::load(dir.path().join("tasks.json")).unwrap()
}

#[test]
fn test_missing_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    assert!(store.list_tasks().is_empty());
}

#[test]
fn test_add_and_reload_persists() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let task = store.add_task("Persisted", "desc", 3, None).unwrap();

    let reloaded = open_store(&dir);
    let found = reloaded.get(&task.id).unwrap();
    assert_eq!(found.name, "Persisted");
    assert_eq!(found.description, "desc");
    assert_eq!(found.priority, 3);
    assert!(!found.completed);
}

#[test]
fn test_add_task_rejects_missing_parent() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let err = store.add_task("Child", "", 1, Some("nope".to_string())).unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn test_update_bumps_updated_at() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let task = store.add_task("Before", "", 1, None).unwrap();

    let updated = store
        .update_task(&task.id, Some("After".to_string()), None, Some(4))
        .unwrap();
    assert_eq!(updated.name, "After");
    assert_eq!(updated.priority, 4);
    assert!(updated.updated_at >= task.updated_at);
    assert!(updated.updated_at > task.created_at);
}

#[test]
fn test_complete_sets_lifecycle_fields() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let task = store.add_task("Work", "", 1, None).unwrap();

    let commit = CommitRef {
        sha: "abc123".to_string(),
        message: Some("fix".to_string()),
        branch: None,
        url: None,
        time: None,
    };
    let done = store
        .complete(&task.id, Some("shipped".to_string()), Some(commit))
        .unwrap();

    assert!(done.completed);
    assert!(done.completed_at.is_some());
    // Completing an unstarted task backfills started_at.
    assert_eq!(done.started_at, done.completed_at);
    assert_eq!(done.result.as_deref(), Some("shipped"));
    assert_eq!(done.metadata.commit.as_ref().unwrap().sha, "abc123");
}

#[test]
fn test_record_sync_does_not_bump_updated_at() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let task = store.add_task("Synced", "", 1, None).unwrap();

    store
        .record_sync(
            &task.id,
            "github",
            RemoteLink {
                id: "42".to_string(),
                url: "https://example.com/42".to_string(),
                state: "open".to_string(),
            },
        )
        .unwrap();

    let after = store.get(&task.id).unwrap();
    assert_eq!(after.updated_at, task.updated_at);
    let link = after.metadata.remote_link("github").unwrap();
    assert_eq!(link.id, "42");
    assert_eq!(link.state, "open");
}

#[test]
fn test_apply_patch_keeps_exact_remote_timestamp() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let task = store.add_task("Patched", "", 1, None).unwrap();

    let remote_time = task.updated_at + chrono::Duration::hours(3);
    let mut patch = TaskPatch::new(task.id.clone());
    patch.updated_at = Some(remote_time);
    patch.completed = Some(true);
    patch.completed_at = Some(remote_time);
    patch.result = Some("done elsewhere".to_string());
    store.apply_patch(&patch).unwrap();

    let after = store.get(&task.id).unwrap();
    assert_eq!(after.updated_at, remote_time);
    assert!(after.completed);
    assert_eq!(after.result.as_deref(), Some("done elsewhere"));
}

#[test]
fn test_add_block_is_symmetric_and_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let a = store.add_task("A", "", 1, None).unwrap();
    let b = store.add_task("B", "", 1, None).unwrap();

    store.add_block(&a.id, &b.id).unwrap();
    store.add_block(&a.id, &b.id).unwrap();

    let a = store.get(&a.id).unwrap();
    let b = store.get(&b.id).unwrap();
    assert_eq!(a.blocked_by, vec![b.id.clone()]);
    assert_eq!(b.blocks, vec![a.id.clone()]);
}

#[test]
fn test_resolve_id_prefix() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let task = store.add_task("Only", "", 1, None).unwrap();

    let prefix = &task.id[..8];
    assert_eq!(store.resolve_id(prefix).unwrap(), task.id);
    assert!(store.resolve_id("zzzzzzzz").is_err());
}

#[test]
fn test_forest_descendants_preorder() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let root = store.add_task("root", "", 1, None).unwrap();
    let a = store.add_task("a", "", 1, Some(root.id.clone())).unwrap();
    let a1 = store.add_task("a1", "", 1, Some(a.id.clone())).unwrap();
    let b = store.add_task("b", "", 1, Some(root.id.clone())).unwrap();

    let forest = store.forest();
    let walk = forest.descendants(&root.id);
    let ids: Vec<&str> = walk.iter().map(|entry| entry.task.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str(), a1.id.as_str(), b.id.as_str()]);

    assert_eq!(walk[0].depth, 1);
    assert_eq!(walk[1].depth, 2);
    assert_eq!(walk[2].depth, 1);
    assert_eq!(walk[1].parent_id.as_deref(), Some(a.id.as_str()));

    assert_eq!(forest.root_of(&a1.id).unwrap().id, root.id);
    assert!(forest.orphans().is_empty());
}
