//! Remote mirroring: shared contracts, the sync engine and the two
//! service integrations.
//!
//! The engine only ever talks to a remote tracker through the
//! [`RemoteItems`] client trait (fetch-by-label, get, create, update,
//! comment) and reports through [`SyncResult`]. Callers dispatch through
//! the [`RemoteTracker`] capability trait, never by inspecting concrete
//! service types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{RemoteLink, Task, TaskPatch};
use crate::store::TaskStore;

pub mod cache;
pub mod diff;
pub mod engine;
pub mod gate;
pub mod github;
pub mod labels;
pub mod shortcut;
pub mod staleness;

/// Errors surfaced by the remote service clients.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("remote item not found: {0}")]
    NotFound(String),

    #[error("remote API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Network(err.to_string())
    }
}

/// Open/closed state of a remote item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Open,
    Closed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Open => "open",
            ItemState::Closed => "closed",
        }
    }
}

/// A remote tracker item as the engine sees it. Held for one sync run at
/// most, never persisted.
#[derive(Debug, Clone)]
pub struct RemoteItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub state: ItemState,
    /// Labels carrying the sync prefix, the only ones compared.
    pub sync_labels: Vec<String>,
    /// Every label on the item; non-sync labels are re-supplied unchanged
    /// on update so they are never clobbered.
    pub all_labels: Vec<String>,
    pub url: String,
    /// Set when the listing endpoint also returns pull/merge requests.
    pub is_pull_request: bool,
}

/// Fields for creating a remote item. Creation always yields an open item;
/// closing travels in a follow-up update within the same flow.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Partial update. `None` fields are omitted from the request entirely,
/// which is what keeps an externally closed item closed: state is only set
/// when transitioning to closed.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub labels: Option<Vec<String>>,
    pub state: Option<ItemState>,
}

/// One page of a label-filtered listing.
#[derive(Debug, Clone)]
pub struct ItemPage {
    pub items: Vec<RemoteItem>,
    /// Opaque token for the next page; `None` when exhausted.
    pub next_page: Option<String>,
}

/// The five operations the engine is allowed to ask of a remote service.
#[async_trait]
pub trait RemoteItems: Send + Sync {
    /// List items (open and closed) carrying `label`, one page at a time.
    async fn list_items_by_label(&self, label: &str, page: Option<&str>) -> Result<ItemPage, RemoteError>;

    async fn get_item(&self, id: &str) -> Result<RemoteItem, RemoteError>;

    async fn create_item(&self, item: NewItem) -> Result<RemoteItem, RemoteError>;

    async fn update_item(&self, id: &str, patch: ItemPatch) -> Result<RemoteItem, RemoteError>;

    /// Post a comment; used only for the final result text when closing.
    async fn create_comment(&self, id: &str, body: &str) -> Result<(), RemoteError>;

    /// Web URL for an item id.
    fn item_url(&self, id: &str) -> String;
}

/// How a service represents a task's descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescendantStrategy {
    /// The whole tree is embedded in one item body (GitHub).
    Embed,
    /// Each descendant becomes its own linked item (Shortcut).
    Link,
}

/// Static description of one remote integration.
#[derive(Debug, Clone, Copy)]
pub struct ServiceProfile {
    /// Key of this service's block in task metadata.
    pub metadata_key: &'static str,
    pub display_name: &'static str,
    pub descendants: DescendantStrategy,
}

/// Outcome of syncing one task against one service.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub task_id: String,
    /// The remote pointer produced or confirmed by this pass.
    pub remote: Option<RemoteLink>,
    /// The remote item was created by this pass.
    pub created: bool,
    /// Nothing needed pushing.
    pub skipped: bool,
    /// Why a completed task's remote item was left open.
    pub not_closing_reason: Option<String>,
    /// The remote copy was newer; `patches` must be applied locally
    /// instead of treating this as a push.
    pub pulled_from_remote: bool,
    pub patches: Vec<TaskPatch>,
    /// Results for descendants materialized as their own remote items.
    pub descendants: Vec<SyncResult>,
}

/// Phase reported around each remote call during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Checking,
    Creating,
    Updating,
    Skipped,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Checking => "checking",
            SyncPhase::Creating => "creating",
            SyncPhase::Updating => "updating",
            SyncPhase::Skipped => "skipped",
        }
    }
}

/// Progress callback payload.
#[derive(Debug, Clone, Copy)]
pub struct SyncProgress<'a> {
    pub task_id: &'a str,
    pub task_name: &'a str,
    pub phase: SyncPhase,
}

/// Callback invoked before and after each remote call.
pub type ProgressFn<'a> = dyn FnMut(SyncProgress<'_>) + Send + 'a;

/// Capability contract every remote integration implements. The CLI and
/// any other caller dispatch only through this trait.
#[async_trait]
pub trait RemoteTracker: Send {
    /// Stable identifier ("github", "shortcut").
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Sync one task (resolved to its top-level ancestor's tree). Returns
    /// `None` for orphaned tasks.
    async fn sync_task(
        &mut self,
        store: &TaskStore,
        task_id: &str,
        progress: &mut ProgressFn<'_>,
    ) -> anyhow::Result<Option<SyncResult>>;

    /// Sync every top-level task sequentially.
    async fn sync_all(&mut self, store: &TaskStore, progress: &mut ProgressFn<'_>) -> anyhow::Result<Vec<SyncResult>>;

    /// This service's recorded item id for a task, if any.
    fn remote_id(&self, task: &Task) -> Option<String>;

    /// This service's recorded item URL for a task, if any.
    fn remote_url(&self, task: &Task) -> Option<String>;
}
