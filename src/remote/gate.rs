//! Completion gate: decides whether finishing a task locally is safe to
//! reflect as a closed remote item.
//!
//! A task closes only when its work is provably on the remote default
//! branch: either its own commit reference verifies, or (commit-less
//! parents) every descendant independently qualifies. Leaves without a
//! commit reference never qualify. The verdict is one-directional: an
//! ineligible task leaves the remote item's current state alone, it never
//! forces it open.

use std::collections::HashMap;

use log::warn;

use crate::git::CommitVerifier;
use crate::model::Task;
use crate::store::TaskForest;

/// Eligibility verdict with its explanation when negative.
#[derive(Debug, Clone)]
pub struct CloseVerdict {
    pub eligible: bool,
    pub reason: Option<String>,
}

/// Evaluates close eligibility over a task subtree.
pub struct CompletionGate<'a> {
    verifier: &'a dyn CommitVerifier,
}

impl<'a> CompletionGate<'a> {
    pub fn new(verifier: &'a dyn CommitVerifier) -> Self {
        Self { verifier }
    }

    pub async fn should_close(&self, task: &Task, forest: &TaskForest) -> bool {
        self.verdict(task, forest).await.eligible
    }

    /// Human-readable reason a task is not eligible, `None` when it is.
    pub async fn explain_not_closing(&self, task: &Task, forest: &TaskForest) -> Option<String> {
        self.verdict(task, forest).await.reason
    }

    /// Evaluate the whole subtree bottom-up, children before parents, so a
    /// parent's verdict aggregates already-settled descendant verdicts.
    pub async fn verdict(&self, task: &Task, forest: &TaskForest) -> CloseVerdict {
        let mut nodes = vec![task.clone()];
        nodes.extend(forest.descendants(&task.id).into_iter().map(|entry| entry.task));

        let mut verdicts: HashMap<String, CloseVerdict> = HashMap::new();
        // Descendants come back in pre-order; walking in reverse settles
        // children before their parents.
        for node in nodes.iter().rev() {
            let verdict = self.node_verdict(node, forest, &verdicts).await;
            verdicts.insert(node.id.clone(), verdict);
        }

        verdicts.remove(&task.id).unwrap_or(CloseVerdict {
            eligible: false,
            reason: Some("not completed".to_string()),
        })
    }

    async fn node_verdict(
        &self,
        task: &Task,
        forest: &TaskForest,
        settled: &HashMap<String, CloseVerdict>,
    ) -> CloseVerdict {
        if !task.completed {
            return CloseVerdict {
                eligible: false,
                reason: Some("not completed".to_string()),
            };
        }

        if let Some(commit) = &task.metadata.commit {
            let verified = match self.verifier.is_commit_on_default_branch(&commit.sha).await {
                Ok(answer) => answer,
                Err(err) => {
                    // Cannot prove the push happened, so do not close.
                    warn!("Commit verification failed for {}: {}", commit.short_sha(), err);
                    false
                }
            };
            return if verified {
                CloseVerdict {
                    eligible: true,
                    reason: None,
                }
            } else {
                CloseVerdict {
                    eligible: false,
                    reason: Some(format!("commit {} not pushed to remote", commit.short_sha())),
                }
            };
        }

        let children = forest.children(&task.id);
        if children.is_empty() {
            return CloseVerdict {
                eligible: false,
                reason: Some("completed without commit reference".to_string()),
            };
        }

        let mut blockers = Vec::new();
        for child in children {
            if let Some(verdict) = settled.get(child) {
                if !verdict.eligible {
                    let reason = verdict.reason.as_deref().unwrap_or("not eligible");
                    blockers.push(format!("subtask {}: {}", child, reason));
                }
            }
        }
        if blockers.is_empty() {
            CloseVerdict {
                eligible: true,
                reason: None,
            }
        } else {
            CloseVerdict {
                eligible: false,
                reason: Some(blockers.join("; ")),
            }
        }
    }
}
