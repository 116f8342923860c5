//! Renders a task tree into a single remote item body and parses it back.
//!
//! Document shape: the root task's marker block, its free-text description,
//! an optional `### Result` section, then, only when the tree has
//! descendants, a `## Subtasks` header followed by one collapsible
//! `<details>` block per descendant in pre-order. Each descendant block
//! carries its own marker block in the sub namespace, so the whole tree
//! survives a round trip through the remote body.

use chrono::{DateTime, Utc};

use crate::codec::marker::{self, NS_ROOT, NS_SUB};
use crate::model::{CommitRef, HierarchicalTask, Task};

/// Section header introducing the descendant blocks.
pub const SUBTASKS_HEADER: &str = "## Subtasks";

const DESCRIPTION_HEADER: &str = "### Description";
const RESULT_HEADER: &str = "### Result";

/// Task fields recovered from a marker block, with defaults for anything
/// absent or unparseable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTask {
    pub id: String,
    pub parent_id: Option<String>,
    /// Recovered from the block's summary line; empty for the root, whose
    /// name lives in the remote item title.
    pub name: String,
    pub description: String,
    pub result: Option<String>,
    pub priority: u8,
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub blocked_by: Vec<String>,
    pub blocks: Vec<String>,
    pub commit: Option<CommitRef>,
    /// Ancestor edges from the document root, derived from parent linkage.
    pub depth: usize,
}

impl ParsedTask {
    fn with_defaults() -> Self {
        Self {
            priority: 1,
            ..Default::default()
        }
    }
}

/// Result of [`parse_document`].
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub root: ParsedTask,
    /// The root's free-text description.
    pub free_text: String,
    /// Descendant tasks in document order.
    pub descendants: Vec<ParsedTask>,
}

/// Render the marker block for one task.
///
/// One line per field needed for round-trip; optional fields emit no line
/// when absent so the parser's defaulting applies.
pub fn render_metadata_block(task: &Task, ns: &str, parent_id: Option<&str>) -> String {
    let mut lines = Vec::new();
    lines.push(marker::marker_line(ns, "id", &task.id));
    if let Some(parent) = parent_id {
        lines.push(marker::marker_line(ns, "parent", parent));
    }
    lines.push(marker::marker_line(ns, "priority", &task.priority.to_string()));
    lines.push(marker::marker_line(ns, "completed", if task.completed { "true" } else { "false" }));
    lines.push(marker::marker_line(ns, "created_at", &task.created_at.to_rfc3339()));
    lines.push(marker::marker_line(ns, "updated_at", &task.updated_at.to_rfc3339()));
    if let Some(started) = task.started_at {
        lines.push(marker::marker_line(ns, "started_at", &started.to_rfc3339()));
    }
    if let Some(completed) = task.completed_at {
        lines.push(marker::marker_line(ns, "completed_at", &completed.to_rfc3339()));
    }
    if !task.blocked_by.is_empty() {
        lines.push(marker::marker_line(ns, "blocked_by", &task.blocked_by.join(",")));
    }
    if !task.blocks.is_empty() {
        lines.push(marker::marker_line(ns, "blocks", &task.blocks.join(",")));
    }
    if let Some(commit) = &task.metadata.commit {
        lines.push(marker::marker_line(ns, "commit_sha", &commit.sha));
        if let Some(message) = &commit.message {
            lines.push(marker::marker_line(ns, "commit_message", message));
        }
        if let Some(branch) = &commit.branch {
            lines.push(marker::marker_line(ns, "commit_branch", branch));
        }
        if let Some(url) = &commit.url {
            lines.push(marker::marker_line(ns, "commit_url", url));
        }
        if let Some(time) = commit.time {
            lines.push(marker::marker_line(ns, "commit_time", &time.to_rfc3339()));
        }
    }
    lines.join("\n")
}

/// Render one descendant as a collapsible block. The tree-prefix glyph on
/// the summary line is purely for human scanability; parsing derives depth
/// from parent linkage instead.
pub fn render_task_block(task: &Task, depth: usize, parent_id: Option<&str>) -> String {
    let glyph = if depth > 0 {
        format!("{}└─ ", "  ".repeat(depth.saturating_sub(1)))
    } else {
        String::new()
    };
    let mark = if task.completed { "x" } else { " " };
    let mut out = String::new();
    out.push_str("<details>\n");
    out.push_str(&format!("<summary>{}[{}] {}</summary>\n\n", glyph, mark, task.name));
    out.push_str(&render_metadata_block(task, NS_SUB, parent_id));
    out.push_str("\n\n");
    out.push_str(DESCRIPTION_HEADER);
    out.push_str("\n\n");
    out.push_str(task.description.trim_end());
    out.push('\n');
    if let Some(result) = &task.result {
        out.push('\n');
        out.push_str(RESULT_HEADER);
        out.push_str("\n\n");
        out.push_str(result.trim_end());
        out.push('\n');
    }
    out.push_str("\n</details>");
    out
}

/// Render a whole task tree into one document.
///
/// With no descendants the output is exactly the root's own content, with
/// no `## Subtasks` header; the header's presence is how an empty tree is
/// told apart from one that lost its subtasks.
pub fn render_document(root: &Task, parent_id: Option<&str>, descendants: &[HierarchicalTask]) -> String {
    let mut out = String::new();
    out.push_str(&render_metadata_block(root, NS_ROOT, parent_id));
    out.push_str("\n\n");
    out.push_str(root.description.trim_end());
    out.push('\n');
    if let Some(result) = &root.result {
        out.push('\n');
        out.push_str(RESULT_HEADER);
        out.push_str("\n\n");
        out.push_str(result.trim_end());
        out.push('\n');
    }
    if !descendants.is_empty() {
        out.push('\n');
        out.push_str(SUBTASKS_HEADER);
        out.push('\n');
        for descendant in descendants {
            out.push('\n');
            out.push_str(&render_task_block(
                &descendant.task,
                descendant.depth,
                descendant.parent_id.as_deref(),
            ));
            out.push('\n');
        }
    }
    out
}

/// Extract the embedded task id from a remote item body, trying the current
/// root marker and then the legacy single-line format.
pub fn extract_task_id(body: &str) -> Option<String> {
    for line in body.lines() {
        if let Some((field, value)) = marker::parse_marker(line, NS_ROOT) {
            if field == "id" {
                return Some(value);
            }
        }
        if let Some(id) = marker::parse_legacy_id(line) {
            return Some(id);
        }
    }
    None
}

/// Parse a document back into root fields, free text and descendants.
///
/// Malformed input never fails: unknown or missing markers fall back to
/// defaults, and a body with no current-format markers at all falls back to
/// a legacy id-only parse.
pub fn parse_document(text: &str) -> ParsedDocument {
    let (root_part, subtasks_part) = split_at_header(text);

    let mut doc = ParsedDocument {
        root: parse_root_part(root_part),
        ..Default::default()
    };
    doc.free_text = doc.root.description.clone();

    if let Some(rest) = subtasks_part {
        for block in split_blocks(rest) {
            if let Some(parsed) = parse_block(&block) {
                doc.descendants.push(parsed);
            }
        }
    }

    assign_depths(&doc.root.id, &mut doc.descendants);
    doc
}

/// Split the document at the subtasks header. Absence means zero
/// descendants.
fn split_at_header(text: &str) -> (&str, Option<&str>) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end() == SUBTASKS_HEADER {
            return (&text[..offset], Some(&text[offset + line.len()..]));
        }
        offset += line.len();
    }
    (text, None)
}

fn parse_root_part(text: &str) -> ParsedTask {
    let mut task = ParsedTask::with_defaults();
    let mut found_marker = false;
    let mut legacy_id = None;
    let mut description = Vec::new();
    let mut result = Vec::new();
    let mut in_result = false;

    for line in text.lines() {
        if let Some((field, value)) = marker::parse_marker(line, NS_ROOT) {
            found_marker = true;
            apply_field(&mut task, &field, &value);
            continue;
        }
        if legacy_id.is_none() {
            if let Some(id) = marker::parse_legacy_id(line) {
                legacy_id = Some(id);
                continue;
            }
        }
        if line.trim_end() == RESULT_HEADER {
            in_result = true;
            continue;
        }
        if in_result {
            result.push(line);
        } else {
            description.push(line);
        }
    }

    if !found_marker {
        if let Some(id) = legacy_id {
            task.id = id;
        }
    }
    task.description = description.join("\n").trim().to_string();
    task.result = section_text(result);
    task
}

/// Split the subtasks section into balanced `<details>` blocks. Descendant
/// descriptions may themselves contain `<details>`, so nesting is tracked
/// rather than matching the first closing tag.
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut depth: i32 = 0;

    for line in text.lines() {
        let opens = line.matches("<details>").count() as i32;
        let closes = line.matches("</details>").count() as i32;
        if depth == 0 && opens == 0 {
            continue;
        }
        current.push(line);
        depth += opens - closes;
        if depth <= 0 {
            blocks.push(current.join("\n"));
            current.clear();
            depth = 0;
        }
    }
    if !current.is_empty() {
        // Unterminated trailing block; parse what is there.
        blocks.push(current.join("\n"));
    }
    blocks
}

fn parse_block(block: &str) -> Option<ParsedTask> {
    let mut task = ParsedTask::with_defaults();
    let mut found_marker = false;
    let mut legacy_id = None;
    let mut summary: Option<&str> = None;
    let mut description = Vec::new();
    let mut result = Vec::new();

    #[derive(PartialEq)]
    enum Section {
        Meta,
        Description,
        Result,
    }
    let mut section = Section::Meta;
    let mut depth: i32 = 0;

    let lines: Vec<&str> = block.lines().collect();
    // Strip the outer <details> line and the final </details>.
    let inner = if lines.len() >= 2 { &lines[1..lines.len() - 1] } else { &lines[..] };

    for line in inner {
        let at_top = depth == 0;
        depth += line.matches("<details>").count() as i32;
        depth -= line.matches("</details>").count() as i32;
        if depth < 0 {
            depth = 0;
        }

        if at_top {
            if summary.is_none() && line.contains("<summary>") {
                summary = Some(line);
                continue;
            }
            if let Some((field, value)) = marker::parse_marker(line, NS_SUB) {
                found_marker = true;
                apply_field(&mut task, &field, &value);
                continue;
            }
            if legacy_id.is_none() {
                if let Some(id) = marker::parse_legacy_id(line) {
                    legacy_id = Some(id);
                    continue;
                }
            }
            match line.trim_end() {
                DESCRIPTION_HEADER => {
                    section = Section::Description;
                    continue;
                }
                RESULT_HEADER => {
                    section = Section::Result;
                    continue;
                }
                _ => {}
            }
        }
        match section {
            Section::Description => description.push(*line),
            Section::Result => result.push(*line),
            Section::Meta => {}
        }
    }

    if let Some(line) = summary {
        let (name, checked) = parse_summary(line);
        task.name = name;
        if !found_marker {
            task.completed = checked;
        }
    }
    if !found_marker {
        task.id = legacy_id?;
    }
    task.description = description.join("\n").trim().to_string();
    task.result = section_text(result);
    Some(task)
}

fn parse_summary(line: &str) -> (String, bool) {
    let inner = line
        .trim()
        .strip_prefix("<summary>")
        .and_then(|rest| rest.strip_suffix("</summary>"))
        .unwrap_or(line)
        .trim_start();
    let inner = inner.strip_prefix("└─ ").unwrap_or(inner).trim_start();
    if let Some(name) = inner.strip_prefix("[x] ") {
        (name.to_string(), true)
    } else if let Some(name) = inner.strip_prefix("[ ] ") {
        (name.to_string(), false)
    } else {
        (inner.to_string(), false)
    }
}

fn apply_field(task: &mut ParsedTask, field: &str, value: &str) {
    match field {
        "id" => task.id = value.to_string(),
        "parent" => task.parent_id = Some(value.to_string()),
        "priority" => task.priority = value.parse().unwrap_or(1),
        "completed" => task.completed = value == "true",
        "created_at" => task.created_at = parse_timestamp(value),
        "updated_at" => task.updated_at = parse_timestamp(value),
        "started_at" => task.started_at = parse_timestamp(value),
        "completed_at" => task.completed_at = parse_timestamp(value),
        "blocked_by" => task.blocked_by = parse_id_list(value),
        "blocks" => task.blocks = parse_id_list(value),
        "commit_sha" => commit_mut(task).sha = value.to_string(),
        "commit_message" => commit_mut(task).message = Some(value.to_string()),
        "commit_branch" => commit_mut(task).branch = Some(value.to_string()),
        "commit_url" => commit_mut(task).url = Some(value.to_string()),
        "commit_time" => commit_mut(task).time = parse_timestamp(value),
        _ => {}
    }
}

fn commit_mut(task: &mut ParsedTask) -> &mut CommitRef {
    task.commit.get_or_insert_with(|| CommitRef {
        sha: String::new(),
        message: None,
        branch: None,
        url: None,
        time: None,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|ts| ts.with_timezone(&Utc))
}

fn parse_id_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

fn section_text(lines: Vec<&str>) -> Option<String> {
    let text = lines.join("\n").trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Derive each descendant's depth by climbing its parent chain toward the
/// root id. A broken chain bottoms out where linkage ends.
fn assign_depths(root_id: &str, descendants: &mut [ParsedTask]) {
    use std::collections::HashMap;
    let parents: HashMap<String, Option<String>> = descendants
        .iter()
        .map(|task| (task.id.clone(), task.parent_id.clone()))
        .collect();

    for task in descendants.iter_mut() {
        let mut depth = 0;
        let mut current = task.parent_id.clone();
        let mut hops = 0;
        while let Some(parent) = current {
            depth += 1;
            hops += 1;
            if parent == root_id || hops > parents.len() {
                break;
            }
            current = parents.get(&parent).cloned().flatten();
        }
        task.depth = depth.max(1);
    }
}
