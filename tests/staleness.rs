use chrono::{Duration, TimeZone, Utc};
use taskmirror::codec::body::{parse_document, render_document};
use taskmirror::model::{CommitRef, HierarchicalTask, Task, TaskMetadata};
use taskmirror::remote::staleness;

fn task(id: &str) -> Task {
    Task {
        id: id.to_string(),
        parent_id: None,
        name: format!("Task {}", id),
        description: "work".to_string(),
        priority: 1,
        completed: false,
        result: None,
        created_at: Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap(),
        started_at: None,
        completed_at: None,
        blocked_by: Vec::new(),
        blocks: Vec::new(),
        metadata: TaskMetadata::default(),
    }
}

#[test]
fn test_remote_newer_produces_patch() {
    let local = task("t1");
    let mut remote = local.clone();
    remote.updated_at = local.updated_at + Duration::hours(3);
    let doc = parse_document(&render_document(&remote, None, &[]));

    let check = staleness::check(&local, &[], &doc);
    assert!(check.stale);
    assert_eq!(check.patches.len(), 1);
    assert_eq!(check.patches[0].task_id, "t1");
    assert_eq!(check.patches[0].updated_at, Some(remote.updated_at));
    assert!(check.patches[0].completed.is_none());
}

#[test]
fn test_remote_equal_or_older_is_not_stale() {
    let local = task("t1");

    let same = parse_document(&render_document(&local, None, &[]));
    assert!(!staleness::check(&local, &[], &same).stale);

    let mut older = local.clone();
    older.updated_at = local.updated_at - Duration::hours(1);
    let doc = parse_document(&render_document(&older, None, &[]));
    assert!(!staleness::check(&local, &[], &doc).stale);
}

#[test]
fn test_remote_completion_is_pulled() {
    let local = task("t1");
    let mut remote = local.clone();
    remote.updated_at = local.updated_at + Duration::minutes(10);
    remote.completed = true;
    remote.completed_at = Some(remote.updated_at);
    remote.started_at = Some(local.updated_at);
    remote.result = Some("finished on the remote side".to_string());
    let doc = parse_document(&render_document(&remote, None, &[]));

    let check = staleness::check(&local, &[], &doc);
    let patch = &check.patches[0];
    assert_eq!(patch.completed, Some(true));
    assert_eq!(patch.completed_at, remote.completed_at);
    assert_eq!(patch.started_at, remote.started_at);
    assert_eq!(patch.result.as_deref(), Some("finished on the remote side"));
}

#[test]
fn test_remote_commit_pulled_when_local_has_none() {
    let local = task("t1");
    let mut remote = local.clone();
    remote.updated_at = local.updated_at + Duration::minutes(1);
    remote.metadata.commit = Some(CommitRef {
        sha: "feedface".to_string(),
        message: Some("remote fix".to_string()),
        branch: None,
        url: None,
        time: None,
    });
    let doc = parse_document(&render_document(&remote, None, &[]));

    let check = staleness::check(&local, &[], &doc);
    assert_eq!(check.patches[0].commit, remote.metadata.commit);

    // A local commit reference is never overwritten.
    let mut local_with_commit = local.clone();
    local_with_commit.metadata.commit = Some(CommitRef {
        sha: "local".to_string(),
        message: None,
        branch: None,
        url: None,
        time: None,
    });
    let check = staleness::check(&local_with_commit, &[], &doc);
    assert!(check.patches[0].commit.is_none());
}

#[test]
fn test_stale_descendant_withholds_push() {
    let root = task("root");
    let mut child = task("child");
    child.parent_id = Some("root".to_string());

    let mut remote_child = child.clone();
    remote_child.updated_at = child.updated_at + Duration::hours(1);
    let remote_descendants = vec![HierarchicalTask {
        task: remote_child.clone(),
        depth: 1,
        parent_id: Some("root".to_string()),
    }];
    let doc = parse_document(&render_document(&root, None, &remote_descendants));

    let local_descendants = vec![HierarchicalTask {
        task: child,
        depth: 1,
        parent_id: Some("root".to_string()),
    }];
    let check = staleness::check(&root, &local_descendants, &doc);
    assert!(check.stale);
    assert_eq!(check.patches.len(), 1);
    assert_eq!(check.patches[0].task_id, "child");
    assert_eq!(check.patches[0].updated_at, Some(remote_child.updated_at));
}

#[test]
fn test_unmatched_descendants_are_ignored() {
    let root = task("root");
    let mut child = task("only-local");
    child.parent_id = Some("root".to_string());
    let doc = parse_document(&render_document(&root, None, &[]));

    let local_descendants = vec![HierarchicalTask {
        task: child,
        depth: 1,
        parent_id: Some("root".to_string()),
    }];
    assert!(!staleness::check(&root, &local_descendants, &doc).stale);
}
