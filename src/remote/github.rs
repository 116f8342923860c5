//! GitHub Issues integration.
//!
//! [`GithubItems`] is a thin wrapper over the issues REST API implementing
//! [`RemoteItems`]; [`GithubTracker`] wires it into a [`SyncEngine`] with
//! the embed strategy, since an issue body can hold a whole task tree.

use async_trait::async_trait;
use log::debug;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{GitConfig, GithubConfig};
use crate::git::GitCli;
use crate::model::Task;
use crate::remote::engine::SyncEngine;
use crate::remote::labels::LabelScheme;
use crate::remote::{
    DescendantStrategy, ItemPage, ItemPatch, ItemState, NewItem, ProgressFn, RemoteError, RemoteItem, RemoteItems,
    RemoteTracker, ServiceProfile, SyncResult,
};
use crate::store::TaskStore;

const GITHUB_API_URL: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;

pub const GITHUB_PROFILE: ServiceProfile = ServiceProfile {
    metadata_key: "github",
    display_name: "GitHub Issues",
    descendants: DescendantStrategy::Embed,
};

/// Issue as returned by the REST API.
#[derive(Debug, Clone, Deserialize)]
struct IssueWire {
    number: i64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    html_url: String,
    #[serde(default)]
    labels: Vec<LabelWire>,
    /// Present when the listing endpoint returns a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelWire {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Debug, Serialize)]
struct UpdateIssueRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

/// Thin GitHub Issues REST client.
pub struct GithubItems {
    client: Client,
    owner: String,
    repo: String,
    token: String,
    scheme: LabelScheme,
}

impl GithubItems {
    pub fn new(owner: String, repo: String, token: String, scheme: LabelScheme) -> Self {
        Self {
            client: Client::new(),
            owner,
            repo,
            token,
            scheme,
        }
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", GITHUB_API_URL, self.owner, self.repo, path)
    }

    fn build_request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, "taskmirror")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn check_response(&self, response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => RemoteError::Auth(message),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if message.contains("rate limit") => {
                RemoteError::RateLimit(message)
            }
            StatusCode::FORBIDDEN => RemoteError::Auth(message),
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            _ => RemoteError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    fn into_item(&self, wire: IssueWire) -> RemoteItem {
        let all_labels: Vec<String> = wire.labels.into_iter().map(|label| label.name).collect();
        RemoteItem {
            id: wire.number.to_string(),
            title: wire.title,
            body: wire.body.unwrap_or_default(),
            state: if wire.state == "closed" { ItemState::Closed } else { ItemState::Open },
            sync_labels: self.scheme.sync_subset(&all_labels).into_iter().collect(),
            all_labels,
            url: wire.html_url,
            is_pull_request: wire.pull_request.is_some(),
        }
    }
}

#[async_trait]
impl RemoteItems for GithubItems {
    async fn list_items_by_label(&self, label: &str, page: Option<&str>) -> Result<ItemPage, RemoteError> {
        let page_number: usize = page.and_then(|token| token.parse().ok()).unwrap_or(1);
        debug!("Listing issues labeled '{}', page {}", label, page_number);

        let request = self.build_request(self.client.get(self.repo_url("issues")).query(&[
            ("labels", label),
            ("state", "all"),
            ("per_page", &PAGE_SIZE.to_string()),
            ("page", &page_number.to_string()),
        ]));
        let response = self.check_response(request.send().await?).await?;
        let issues: Vec<IssueWire> = response.json().await?;

        let next_page = (issues.len() == PAGE_SIZE).then(|| (page_number + 1).to_string());
        Ok(ItemPage {
            items: issues.into_iter().map(|issue| self.into_item(issue)).collect(),
            next_page,
        })
    }

    async fn get_item(&self, id: &str) -> Result<RemoteItem, RemoteError> {
        let request = self.build_request(self.client.get(self.repo_url(&format!("issues/{}", id))));
        let response = self.check_response(request.send().await?).await?;
        let issue: IssueWire = response.json().await?;
        Ok(self.into_item(issue))
    }

    async fn create_item(&self, item: NewItem) -> Result<RemoteItem, RemoteError> {
        let request = self.build_request(self.client.post(self.repo_url("issues")).json(&CreateIssueRequest {
            title: &item.title,
            body: &item.body,
            labels: &item.labels,
        }));
        let response = self.check_response(request.send().await?).await?;
        let issue: IssueWire = response.json().await?;
        Ok(self.into_item(issue))
    }

    async fn update_item(&self, id: &str, patch: ItemPatch) -> Result<RemoteItem, RemoteError> {
        let request = self
            .build_request(self.client.patch(self.repo_url(&format!("issues/{}", id))))
            .json(&UpdateIssueRequest {
                title: patch.title.as_deref(),
                body: patch.body.as_deref(),
                labels: patch.labels.as_deref(),
                state: patch.state.map(|state| state.as_str()),
            });
        let response = self.check_response(request.send().await?).await?;
        let issue: IssueWire = response.json().await?;
        Ok(self.into_item(issue))
    }

    async fn create_comment(&self, id: &str, body: &str) -> Result<(), RemoteError> {
        let request = self
            .build_request(self.client.post(self.repo_url(&format!("issues/{}/comments", id))))
            .json(&CreateCommentRequest { body });
        self.check_response(request.send().await?).await?;
        Ok(())
    }

    fn item_url(&self, id: &str) -> String {
        format!("https://github.com/{}/{}/issues/{}", self.owner, self.repo, id)
    }
}

/// GitHub integration behind the tracker capability contract.
pub struct GithubTracker {
    engine: SyncEngine,
}

impl GithubTracker {
    /// Build a tracker for one sync invocation. The token comes from the
    /// configured environment variable.
    pub fn from_config(config: &GithubConfig, sync_label: &str, git: &GitConfig) -> anyhow::Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow::anyhow!("GitHub token not found in environment variable '{}'", config.token_env))?;
        let scheme = LabelScheme::new(sync_label);
        let client = GithubItems::new(config.owner.clone(), config.repo.clone(), token, scheme.clone());
        let verifier = GitCli::new(&git.repo_dir, git.default_branch.clone());
        Ok(Self {
            engine: SyncEngine::new(Box::new(client), Box::new(verifier), scheme, GITHUB_PROFILE),
        })
    }
}

#[async_trait]
impl RemoteTracker for GithubTracker {
    fn id(&self) -> &'static str {
        GITHUB_PROFILE.metadata_key
    }

    fn display_name(&self) -> &'static str {
        GITHUB_PROFILE.display_name
    }

    async fn sync_task(
        &mut self,
        store: &TaskStore,
        task_id: &str,
        progress: &mut ProgressFn<'_>,
    ) -> anyhow::Result<Option<SyncResult>> {
        self.engine.sync_task(store, task_id, progress).await
    }

    async fn sync_all(&mut self, store: &TaskStore, progress: &mut ProgressFn<'_>) -> anyhow::Result<Vec<SyncResult>> {
        self.engine.sync_all(store, progress).await
    }

    fn remote_id(&self, task: &Task) -> Option<String> {
        task.metadata.github.as_ref().map(|link| link.id.clone())
    }

    fn remote_url(&self, task: &Task) -> Option<String> {
        task.metadata.github.as_ref().map(|link| link.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_wire_deserializes_and_flags_pull_requests() {
        let json = r#"{
            "number": 42,
            "title": "Fix the widget",
            "body": "<!-- taskmirror:task:id:t1 -->",
            "state": "open",
            "html_url": "https://github.com/acme/widgets/issues/42",
            "labels": [{"id": 1, "name": "taskmirror", "color": "aabbcc"}, {"id": 2, "name": "bug", "color": "ff0000"}],
            "pull_request": {"url": "https://api.github.com/repos/acme/widgets/pulls/42"}
        }"#;
        let wire: IssueWire = serde_json::from_str(json).unwrap();
        assert_eq!(wire.number, 42);
        assert!(wire.pull_request.is_some());

        let client = GithubItems::new(
            "acme".into(),
            "widgets".into(),
            "token".into(),
            LabelScheme::new("taskmirror"),
        );
        let item = client.into_item(wire);
        assert!(item.is_pull_request);
        assert_eq!(item.state, ItemState::Open);
        assert_eq!(item.sync_labels, vec!["taskmirror".to_string()]);
        assert_eq!(item.all_labels.len(), 2);
    }

    #[test]
    fn update_request_omits_unset_fields() {
        let request = UpdateIssueRequest {
            title: None,
            body: Some("content"),
            labels: None,
            state: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"body":"content"}"#);
    }
}
