//! File-based task store and the forest view over it.
//!
//! The store is the authoritative copy: a single JSON file persisted
//! atomically (write a temp file, then rename over the old one). The
//! [`TaskForest`] is a per-call index, an arena keyed by id plus a
//! parent-to-children adjacency map, so descendant walks, root resolution
//! and orphan detection stay O(n) on deep trees.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::warn;

use crate::model::{CommitRef, HierarchicalTask, RemoteLink, Task, TaskPatch};

/// JSON-file-backed task store.
pub struct TaskStore {
    path: PathBuf,
    tasks: Vec<Task>,
}

impl TaskStore {
    /// Load the store from `path`, or start empty when the file does not
    /// exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tasks = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read task store: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse task store: {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self { path, tasks })
    }

    /// Persist atomically: serialize to a sibling temp file, then rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(&self.tasks).context("Failed to serialize tasks")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace task store: {}", self.path.display()))?;
        Ok(())
    }

    pub fn list_tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Resolve a full id or a unique id prefix, for CLI ergonomics.
    pub fn resolve_id(&self, prefix: &str) -> Result<String> {
        if self.get(prefix).is_some() {
            return Ok(prefix.to_string());
        }
        let matches: Vec<&Task> = self.tasks.iter().filter(|task| task.id.starts_with(prefix)).collect();
        match matches.len() {
            0 => bail!("No task matches '{}'", prefix),
            1 => Ok(matches[0].id.clone()),
            n => bail!("'{}' is ambiguous ({} tasks match)", prefix, n),
        }
    }

    /// Create a task. The parent, when given, must exist.
    pub fn add_task(
        &mut self,
        name: &str,
        description: &str,
        priority: u8,
        parent_id: Option<String>,
    ) -> Result<Task> {
        if let Some(parent) = &parent_id {
            if self.get(parent).is_none() {
                bail!("Parent task '{}' not found", parent);
            }
        }
        let task = Task::new(name, description, priority, parent_id);
        self.tasks.push(task.clone());
        self.save()?;
        Ok(task)
    }

    /// Edit task content. Bumps `updated_at`.
    pub fn update_task(
        &mut self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
        priority: Option<u8>,
    ) -> Result<Task> {
        let task = self.get_mut(id)?;
        if let Some(name) = name {
            task.name = name;
        }
        if let Some(description) = description {
            task.description = description;
        }
        if let Some(priority) = priority {
            task.priority = priority;
        }
        task.updated_at = Utc::now();
        let task = task.clone();
        self.save()?;
        Ok(task)
    }

    /// Mark a task started. Bumps `updated_at`.
    pub fn start(&mut self, id: &str) -> Result<Task> {
        let now = Utc::now();
        let task = self.get_mut(id)?;
        if task.started_at.is_none() {
            task.started_at = Some(now);
        }
        task.updated_at = now;
        let task = task.clone();
        self.save()?;
        Ok(task)
    }

    /// Complete a task, recording its result and, when known, the commit
    /// that realized it. Bumps `updated_at`.
    pub fn complete(&mut self, id: &str, result: Option<String>, commit: Option<CommitRef>) -> Result<Task> {
        let now = Utc::now();
        let task = self.get_mut(id)?;
        task.completed = true;
        task.completed_at = Some(now);
        if task.started_at.is_none() {
            task.started_at = Some(now);
        }
        if result.is_some() {
            task.result = result;
        }
        if commit.is_some() {
            task.metadata.commit = commit;
        }
        task.updated_at = now;
        let task = task.clone();
        self.save()?;
        Ok(task)
    }

    /// Record one remote service's pointer block after a sync.
    ///
    /// Deliberately does not bump `updated_at`: sync bookkeeping is not a
    /// content edit, and bumping it would make every run look newer than
    /// the remote it just pushed.
    pub fn record_sync(&mut self, id: &str, metadata_key: &str, link: RemoteLink) -> Result<()> {
        let task = self.get_mut(id)?;
        task.metadata.set_remote_link(metadata_key, link);
        self.save()
    }

    /// Apply a staleness patch verbatim, including the exact remote
    /// `updated_at`.
    pub fn apply_patch(&mut self, patch: &TaskPatch) -> Result<()> {
        let task = self.get_mut(&patch.task_id)?;
        if let Some(updated_at) = patch.updated_at {
            task.updated_at = updated_at;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        if let Some(completed_at) = patch.completed_at {
            task.completed_at = Some(completed_at);
        }
        if let Some(started_at) = patch.started_at {
            task.started_at = Some(started_at);
        }
        if let Some(result) = &patch.result {
            task.result = Some(result.clone());
        }
        if let Some(commit) = &patch.commit {
            task.metadata.commit = Some(commit.clone());
        }
        self.save()
    }

    /// Record that `id` is blocked by `blocker`, keeping the inverse list
    /// in sync.
    pub fn add_block(&mut self, id: &str, blocker: &str) -> Result<()> {
        if self.get(blocker).is_none() {
            bail!("Blocking task '{}' not found", blocker);
        }
        {
            let task = self.get_mut(id)?;
            if !task.blocked_by.contains(&blocker.to_string()) {
                task.blocked_by.push(blocker.to_string());
            }
        }
        {
            let blocker = self.get_mut(blocker)?;
            if !blocker.blocks.contains(&id.to_string()) {
                blocker.blocks.push(id.to_string());
            }
        }
        self.save()
    }

    /// Build the forest view over the current tasks.
    pub fn forest(&self) -> TaskForest {
        TaskForest::build(&self.tasks)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| anyhow::anyhow!("Task '{}' not found", id))
    }
}

/// Arena + adjacency view of the task forest.
pub struct TaskForest {
    arena: HashMap<String, Task>,
    children: HashMap<String, Vec<String>>,
    roots: Vec<String>,
    orphans: Vec<String>,
}

impl TaskForest {
    /// Index tasks by id and parent. Children are ordered by creation time
    /// then id so walks are deterministic. Tasks whose parent id points at
    /// a missing task are orphans and belong to no tree.
    pub fn build(tasks: &[Task]) -> Self {
        let arena: HashMap<String, Task> = tasks.iter().map(|task| (task.id.clone(), task.clone())).collect();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut roots = Vec::new();
        let mut orphans = Vec::new();

        let mut ordered: Vec<&Task> = tasks.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        for task in ordered {
            match &task.parent_id {
                None => roots.push(task.id.clone()),
                Some(parent) if arena.contains_key(parent) => {
                    children.entry(parent.clone()).or_default().push(task.id.clone());
                }
                Some(parent) => {
                    warn!("Task {} references missing parent {}; treating as orphaned", task.id, parent);
                    orphans.push(task.id.clone());
                }
            }
        }

        Self {
            arena,
            children,
            roots,
            orphans,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.arena.get(id)
    }

    /// Top-level tasks in creation order.
    pub fn roots(&self) -> Vec<&Task> {
        self.roots.iter().filter_map(|id| self.arena.get(id)).collect()
    }

    /// Ids of tasks whose parent is missing.
    pub fn orphans(&self) -> &[String] {
        &self.orphans
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All descendants of `id` in pre-order, with depth counted from `id`.
    pub fn descendants(&self, id: &str) -> Vec<HierarchicalTask> {
        let mut out = Vec::new();
        // Reverse so the explicit stack pops children in creation order.
        let mut stack: Vec<(String, usize, String)> = self
            .children(id)
            .iter()
            .rev()
            .map(|child| (child.clone(), 1, id.to_string()))
            .collect();

        while let Some((current, depth, parent)) = stack.pop() {
            if let Some(task) = self.arena.get(&current) {
                out.push(HierarchicalTask {
                    task: task.clone(),
                    depth,
                    parent_id: Some(parent),
                });
                for child in self.children(&current).iter().rev() {
                    stack.push((child.clone(), depth + 1, current.clone()));
                }
            }
        }
        out
    }

    /// Climb to the top-level ancestor of `id`. Returns `None` when the
    /// parent chain is broken anywhere on the way up (the task is part of
    /// an orphaned subtree).
    pub fn root_of(&self, id: &str) -> Option<&Task> {
        let mut current = self.arena.get(id)?;
        let mut hops = 0;
        while let Some(parent) = &current.parent_id {
            current = self.arena.get(parent)?;
            hops += 1;
            if hops > self.arena.len() {
                return None;
            }
        }
        Some(current)
    }
}
