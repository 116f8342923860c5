//! Shortcut Stories integration.
//!
//! [`ShortcutItems`] wraps the Stories REST API behind [`RemoteItems`];
//! [`ShortcutTracker`] runs the engine with the link strategy, because a
//! story cannot embed a whole task tree: each descendant becomes its own
//! linked story in the engine's second pass. Open/closed maps onto the two
//! configured workflow state ids.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{GitConfig, ShortcutConfig};
use crate::git::GitCli;
use crate::model::Task;
use crate::remote::engine::SyncEngine;
use crate::remote::labels::LabelScheme;
use crate::remote::{
    DescendantStrategy, ItemPage, ItemPatch, ItemState, NewItem, ProgressFn, RemoteError, RemoteItem, RemoteItems,
    RemoteTracker, ServiceProfile, SyncResult,
};
use crate::store::TaskStore;

const SHORTCUT_API_URL: &str = "https://api.app.shortcut.com/api/v3";
const PAGE_SIZE: usize = 25;

pub const SHORTCUT_PROFILE: ServiceProfile = ServiceProfile {
    metadata_key: "shortcut",
    display_name: "Shortcut Stories",
    descendants: DescendantStrategy::Link,
};

#[derive(Debug, Clone, Deserialize)]
struct StoryWire {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    completed: bool,
    app_url: String,
    #[serde(default)]
    labels: Vec<StoryLabelWire>,
}

#[derive(Debug, Clone, Deserialize)]
struct StoryLabelWire {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    data: Vec<StoryWire>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct LabelParam<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateStoryRequest<'a> {
    name: &'a str,
    description: &'a str,
    labels: Vec<LabelParam<'a>>,
    workflow_state_id: u64,
}

#[derive(Debug, Serialize)]
struct UpdateStoryRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<LabelParam<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow_state_id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    text: &'a str,
}

/// Thin Shortcut Stories REST client.
pub struct ShortcutItems {
    client: Client,
    token: String,
    open_state_id: u64,
    done_state_id: u64,
    scheme: LabelScheme,
}

impl ShortcutItems {
    pub fn new(token: String, open_state_id: u64, done_state_id: u64, scheme: LabelScheme) -> Self {
        Self {
            client: Client::new(),
            token,
            open_state_id,
            done_state_id,
            scheme,
        }
    }

    fn build_request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Shortcut-Token", &self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
    }

    async fn check_response(&self, response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Auth(message),
            StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimit(message),
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            _ => RemoteError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    fn into_item(&self, wire: StoryWire) -> RemoteItem {
        let all_labels: Vec<String> = wire.labels.into_iter().map(|label| label.name).collect();
        RemoteItem {
            id: wire.id.to_string(),
            title: wire.name,
            body: wire.description.unwrap_or_default(),
            state: if wire.completed { ItemState::Closed } else { ItemState::Open },
            sync_labels: self.scheme.sync_subset(&all_labels).into_iter().collect(),
            all_labels,
            url: wire.app_url,
            is_pull_request: false,
        }
    }

    fn state_id(&self, state: ItemState) -> u64 {
        match state {
            ItemState::Open => self.open_state_id,
            ItemState::Closed => self.done_state_id,
        }
    }
}

#[async_trait]
impl RemoteItems for ShortcutItems {
    async fn list_items_by_label(&self, label: &str, page: Option<&str>) -> Result<ItemPage, RemoteError> {
        debug!("Searching stories labeled '{}' (cursor: {:?})", label, page);
        let query = format!("label:\"{}\"", label);
        let mut params: Vec<(&str, String)> = vec![
            ("query", query),
            ("page_size", PAGE_SIZE.to_string()),
            ("detail", "full".to_string()),
        ];
        if let Some(cursor) = page {
            params.push(("next", cursor.to_string()));
        }

        let request = self.build_request(
            self.client
                .get(format!("{}/search/stories", SHORTCUT_API_URL))
                .query(&params),
        );
        let response = self.check_response(request.send().await?).await?;
        let search: SearchResponse = response.json().await?;

        Ok(ItemPage {
            items: search.data.into_iter().map(|story| self.into_item(story)).collect(),
            next_page: search.next,
        })
    }

    async fn get_item(&self, id: &str) -> Result<RemoteItem, RemoteError> {
        let request = self.build_request(self.client.get(format!("{}/stories/{}", SHORTCUT_API_URL, id)));
        let response = self.check_response(request.send().await?).await?;
        let story: StoryWire = response.json().await?;
        Ok(self.into_item(story))
    }

    async fn create_item(&self, item: NewItem) -> Result<RemoteItem, RemoteError> {
        let request = self
            .build_request(self.client.post(format!("{}/stories", SHORTCUT_API_URL)))
            .json(&CreateStoryRequest {
                name: &item.title,
                description: &item.body,
                labels: item.labels.iter().map(|name| LabelParam { name }).collect(),
                workflow_state_id: self.open_state_id,
            });
        let response = self.check_response(request.send().await?).await?;
        let story: StoryWire = response.json().await?;
        Ok(self.into_item(story))
    }

    async fn update_item(&self, id: &str, patch: ItemPatch) -> Result<RemoteItem, RemoteError> {
        let labels = patch
            .labels
            .as_ref()
            .map(|labels| labels.iter().map(|name| LabelParam { name }).collect());
        let request = self
            .build_request(self.client.put(format!("{}/stories/{}", SHORTCUT_API_URL, id)))
            .json(&UpdateStoryRequest {
                name: patch.title.as_deref(),
                description: patch.body.as_deref(),
                labels,
                workflow_state_id: patch.state.map(|state| self.state_id(state)),
            });
        let response = self.check_response(request.send().await?).await?;
        let story: StoryWire = response.json().await?;
        Ok(self.into_item(story))
    }

    async fn create_comment(&self, id: &str, body: &str) -> Result<(), RemoteError> {
        let request = self
            .build_request(self.client.post(format!("{}/stories/{}/comments", SHORTCUT_API_URL, id)))
            .json(&CreateCommentRequest { text: body });
        self.check_response(request.send().await?).await?;
        Ok(())
    }

    fn item_url(&self, id: &str) -> String {
        format!("https://app.shortcut.com/story/{}", id)
    }
}

/// Shortcut integration behind the tracker capability contract.
pub struct ShortcutTracker {
    engine: SyncEngine,
}

impl ShortcutTracker {
    pub fn from_config(config: &ShortcutConfig, sync_label: &str, git: &GitConfig) -> anyhow::Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow::anyhow!("Shortcut token not found in environment variable '{}'", config.token_env))?;
        let scheme = LabelScheme::new(sync_label);
        let client = ShortcutItems::new(token, config.open_state_id, config.done_state_id, scheme.clone());
        let verifier = GitCli::new(&git.repo_dir, git.default_branch.clone());
        Ok(Self {
            engine: SyncEngine::new(Box::new(client), Box::new(verifier), scheme, SHORTCUT_PROFILE),
        })
    }
}

#[async_trait]
impl RemoteTracker for ShortcutTracker {
    fn id(&self) -> &'static str {
        SHORTCUT_PROFILE.metadata_key
    }

    fn display_name(&self) -> &'static str {
        SHORTCUT_PROFILE.display_name
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
        task.metadata.shortcut.as_ref().map(|link| link.id.clone())
    }

    fn remote_url(&self, task: &Task) -> Option<String> {
        task.metadata.shortcut.as_ref().map(|link| link.url.clone())
    }
}
