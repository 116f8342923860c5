//! Commit verification against the remote default branch.
//!
//! The completion gate only needs one yes/no question answered; it is kept
//! behind a trait so the git-CLI implementation can be swapped for a VCS
//! API call without touching gate logic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::process::Command;

use crate::model::CommitRef;

/// Answers "is this commit on the remote default branch?".
#[async_trait]
pub trait CommitVerifier: Send + Sync {
    async fn is_commit_on_default_branch(&self, sha: &str) -> Result<bool>;
}

/// Verifier backed by the git CLI.
///
/// Asks `git merge-base --is-ancestor <sha> origin/<default-branch>` and
/// memoizes answers for the lifetime of the instance (one sync run).
pub struct GitCli {
    repo_dir: PathBuf,
    default_branch: String,
    memo: Mutex<HashMap<String, bool>>,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>, default_branch: impl Into<String>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            default_branch: default_branch.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .with_context(|| format!("Failed to run git {}", args.join(" ")))
    }

    /// Best-effort details for a local commit, used when recording a commit
    /// reference at completion time.
    pub async fn commit_details(&self, sha: &str) -> Result<CommitRef> {
        let output = self.git(&["show", "-s", "--format=%H%x00%s%x00%cI", sha]).await?;
        if !output.status.success() {
            bail!("Unknown commit '{}': {}", sha, String::from_utf8_lossy(&output.stderr).trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut parts = stdout.trim().split('\u{0}');
        let full_sha = parts.next().unwrap_or(sha).to_string();
        let message = parts.next().map(str::to_string);
        let time = parts
            .next()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        let branch = match self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await {
            Ok(out) if out.status.success() => {
                let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
                (!name.is_empty() && name != "HEAD").then_some(name)
            }
            _ => None,
        };
        let url = match self.git(&["remote", "get-url", "origin"]).await {
            Ok(out) if out.status.success() => {
                commit_url(String::from_utf8_lossy(&out.stdout).trim(), &full_sha)
            }
            _ => None,
        };

        Ok(CommitRef {
            sha: full_sha,
            message,
            branch,
            url,
            time,
        })
    }
}

#[async_trait]
impl CommitVerifier for GitCli {
    async fn is_commit_on_default_branch(&self, sha: &str) -> Result<bool> {
        if let Some(answer) = self.memo.lock().unwrap().get(sha) {
            return Ok(*answer);
        }

        let target = format!("origin/{}", self.default_branch);
        let output = self.git(&["merge-base", "--is-ancestor", sha, &target]).await?;
        let answer = match output.status.code() {
            Some(0) => true,
            Some(1) => false,
            _ => bail!(
                "git merge-base failed for {}: {}",
                sha,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        };
        debug!("Commit {} on {}: {}", sha, target, answer);

        self.memo.lock().unwrap().insert(sha.to_string(), answer);
        Ok(answer)
    }
}

/// Derive a web URL for a commit from the origin remote, when the remote is
/// a recognizable https or ssh GitHub-style URL.
fn commit_url(remote: &str, sha: &str) -> Option<String> {
    let base = if let Some(rest) = remote.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        format!("https://{}/{}", host, path.trim_end_matches(".git"))
    } else if remote.starts_with("https://") {
        remote.trim_end_matches(".git").to_string()
    } else {
        return None;
    };
    Some(format!("{}/commit/{}", base, sha))
}
