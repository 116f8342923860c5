//! Command-line interface: argument definitions and command handlers.
//!
//! Presentation only. All sync work goes through the [`RemoteTracker`]
//! capability trait; the handlers here construct one tracker per service
//! per invocation, print progress, and write the returned metadata blocks
//! and staleness patches back into the store.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::git::GitCli;
use crate::model::Task;
use crate::remote::github::GithubTracker;
use crate::remote::shortcut::ShortcutTracker;
use crate::remote::{RemoteTracker, SyncProgress, SyncResult};
use crate::store::{TaskForest, TaskStore};

#[derive(Debug, Parser)]
#[command(name = "taskmirror", version, about = "Local-first task tracker mirrored onto GitHub Issues and Shortcut Stories")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a task
    Add {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Priority (1 = lowest)
        #[arg(short, long, default_value_t = 1)]
        priority: u8,
        /// Parent task id, making this a subtask
        #[arg(long)]
        parent: Option<String>,
    },
    /// List tasks as a tree
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
    },
    /// Show one task in full
    Show { id: String },
    /// Mark a task started
    Start { id: String },
    /// Mark a task completed
    Done {
        id: String,
        /// Outcome text recorded with the task
        #[arg(short, long)]
        result: Option<String>,
        /// Commit sha that realized the work
        #[arg(short, long)]
        commit: Option<String>,
    },
    /// Record that a task is blocked by another
    Block {
        id: String,
        /// Id of the blocking task
        #[arg(long)]
        on: String,
    },
    /// Mirror tasks onto the configured remote services
    Sync {
        /// Sync only this service ("github" or "shortcut")
        #[arg(short, long)]
        service: Option<String>,
        /// Sync only this task's tree
        #[arg(short, long)]
        task: Option<String>,
    },
    /// Write a default config file
    InitConfig,
}

/// Dispatch a parsed command.
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::InitConfig => {
            let path = Config::get_default_config_path()?;
            Config::generate_default_config(path)
        }
        command => {
            let mut store = TaskStore::load(&config.store.path)
                .with_context(|| format!("Failed to load task store from {}", config.store.path.display()))?;
            match command {
                Command::Add {
                    name,
                    description,
                    priority,
                    parent,
                } => {
                    let parent = parent.map(|p| store.resolve_id(&p)).transpose()?;
                    let task = store.add_task(&name, &description, priority, parent)?;
                    println!("Added {} ({})", task.name, task.id);
                    Ok(())
                }
                Command::List { all } => {
                    list_tasks(&store, all);
                    Ok(())
                }
                Command::Show { id } => {
                    let id = store.resolve_id(&id)?;
                    let task = store
                        .get(&id)
                        .ok_or_else(|| anyhow::anyhow!("Task '{}' not found", id))?;
                    show_task(task);
                    Ok(())
                }
                Command::Start { id } => {
                    let id = store.resolve_id(&id)?;
                    let task = store.start(&id)?;
                    println!("Started {} ({})", task.name, task.id);
                    Ok(())
                }
                Command::Done { id, result, commit } => {
                    let id = store.resolve_id(&id)?;
                    let commit = match commit {
                        Some(sha) => {
                            let git = GitCli::new(&config.git.repo_dir, config.git.default_branch.clone());
                            Some(git.commit_details(&sha).await?)
                        }
                        None => None,
                    };
                    let task = store.complete(&id, result, commit)?;
                    println!("Completed {} ({})", task.name, task.id);
                    if task.metadata.commit.is_none() {
                        println!("Note: no commit reference recorded; the remote item will stay open");
                    }
                    Ok(())
                }
                Command::Block { id, on } => {
                    let id = store.resolve_id(&id)?;
                    let on = store.resolve_id(&on)?;
                    store.add_block(&id, &on)?;
                    println!("{} is now blocked by {}", id, on);
                    Ok(())
                }
                Command::Sync { service, task } => sync(&mut store, &config, service, task).await,
                Command::InitConfig => unreachable!("handled above"),
            }
        }
    }
}

fn build_trackers(config: &Config, service: Option<&str>) -> Result<Vec<Box<dyn RemoteTracker>>> {
    let mut trackers: Vec<Box<dyn RemoteTracker>> = Vec::new();

    let wanted = |id: &str| service.map(|s| s == id).unwrap_or(true);
    if config.github.enabled && wanted("github") {
        trackers.push(Box::new(GithubTracker::from_config(&config.github, &config.sync.label, &config.git)?));
    }
    if config.shortcut.enabled && wanted("shortcut") {
        trackers.push(Box::new(ShortcutTracker::from_config(&config.shortcut, &config.sync.label, &config.git)?));
    }

    if trackers.is_empty() {
        match service {
            Some(service) => bail!("Service '{}' is unknown or not enabled in the config", service),
            None => bail!("No remote service is enabled; set github.enabled or shortcut.enabled in the config"),
        }
    }
    Ok(trackers)
}

async fn sync(store: &mut TaskStore, config: &Config, service: Option<String>, task: Option<String>) -> Result<()> {
    let trackers = build_trackers(config, service.as_deref())?;
    let task_id = task.map(|t| store.resolve_id(&t)).transpose()?;

    for mut tracker in trackers {
        println!("Syncing to {}...", tracker.display_name());
        let mut progress = |p: SyncProgress<'_>| {
            println!("  [{}] {}", p.phase.as_str(), p.task_name);
        };

        let results = match &task_id {
            Some(id) => {
                let result = tracker
                    .sync_task(store, id, &mut progress)
                    .await
                    .with_context(|| format!("{} sync failed", tracker.display_name()))?;
                match result {
                    Some(result) => vec![result],
                    None => {
                        println!("  Task {} is orphaned and was not synced", id);
                        Vec::new()
                    }
                }
            }
            None => tracker
                .sync_all(store, &mut progress)
                .await
                .with_context(|| format!("{} sync failed", tracker.display_name()))?,
        };

        let mut summary = Summary::default();
        for result in &results {
            record_result(store, tracker.id(), result, &mut summary)?;
        }
        println!(
            "{}: {} created, {} updated, {} skipped, {} pulled from remote",
            tracker.display_name(),
            summary.created,
            summary.updated,
            summary.skipped,
            summary.pulled
        );
    }
    Ok(())
}

#[derive(Default)]
struct Summary {
    created: usize,
    updated: usize,
    skipped: usize,
    pulled: usize,
}

/// Write one sync result (and its nested descendant results) back into the
/// store: metadata pointers on pushes, patches on pulls.
fn record_result(store: &mut TaskStore, tracker_id: &str, result: &SyncResult, summary: &mut Summary) -> Result<()> {
    if result.pulled_from_remote {
        summary.pulled += 1;
        for patch in &result.patches {
            store.apply_patch(patch)?;
        }
    } else {
        if result.created {
            summary.created += 1;
        } else if result.skipped {
            summary.skipped += 1;
        } else {
            summary.updated += 1;
        }
        if let Some(link) = &result.remote {
            store.record_sync(&result.task_id, tracker_id, link.clone())?;
        }
    }
    if let Some(reason) = &result.not_closing_reason {
        println!("  Not closing {}: {}", result.task_id, reason);
    }
    for nested in &result.descendants {
        record_result(store, tracker_id, nested, summary)?;
    }
    Ok(())
}

fn list_tasks(store: &TaskStore, all: bool) {
    let forest = store.forest();
    for root in forest.roots() {
        print_subtree(&forest, root, 0, all);
    }
    for orphan in forest.orphans() {
        println!("! {} (orphaned: parent missing)", orphan);
    }
}

fn print_subtree(forest: &TaskForest, task: &Task, depth: usize, all: bool) {
    if task.completed && !all {
        return;
    }
    let mark = if task.completed { "x" } else { " " };
    println!("[{}] {}{} {} (p{})", mark, "  ".repeat(depth), &task.id[..8.min(task.id.len())], task.name, task.priority);
    for child in forest.children(&task.id) {
        if let Some(child) = forest.get(child) {
            print_subtree(forest, child, depth + 1, all);
        }
    }
}

fn show_task(task: &Task) {
    println!("{} ({})", task.name, task.id);
    println!("  status: {}", task.status().as_str());
    println!("  priority: {}", task.priority);
    if let Some(parent) = &task.parent_id {
        println!("  parent: {}", parent);
    }
    if !task.description.is_empty() {
        println!("  description: {}", task.description);
    }
    if let Some(result) = &task.result {
        println!("  result: {}", result);
    }
    if !task.blocked_by.is_empty() {
        println!("  blocked by: {}", task.blocked_by.join(", "));
    }
    if !task.blocks.is_empty() {
        println!("  blocks: {}", task.blocks.join(", "));
    }
    if let Some(commit) = &task.metadata.commit {
        println!("  commit: {}", commit.short_sha());
    }
    if let Some(link) = &task.metadata.github {
        println!("  github: #{} ({}) {}", link.id, link.state, link.url);
    }
    if let Some(link) = &task.metadata.shortcut {
        println!("  shortcut: {} ({}) {}", link.id, link.state, link.url);
    }
    println!("  created: {}", task.created_at.to_rfc3339());
    println!("  updated: {}", task.updated_at.to_rfc3339());
}
