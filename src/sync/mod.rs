//! Sync orchestration core.
//!
//! Schedule lifecycle management, the durable sync workflow, the retryable
//! activities it drives, and the backoff/telemetry controller that adapts
//! the cron cadence to remote health.

pub mod activities;
pub mod backoff;
pub mod schedule_manager;
pub mod workflow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entities synchronized from the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Issue,
    Comment,
    Worklog,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Issue, EntityKind::Comment, EntityKind::Worklog];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Issue => "issue",
            EntityKind::Comment => "comment",
            EntityKind::Worklog => "worklog",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input handed to every sync workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncWorkflowInput {
    pub project_id: Uuid,
    /// Ignore stored sync state and re-fetch everything.
    #[serde(default)]
    pub full_resync: bool,
    /// Restrict the run to these remote accounts instead of the project's
    /// tracked set.
    #[serde(default)]
    pub account_ids: Option<Vec<String>>,
}

impl SyncWorkflowInput {
    /// Input for a plain scheduled run.
    pub fn scheduled(project_id: Uuid) -> Self {
        Self {
            project_id,
            full_resync: false,
            account_ids: None,
        }
    }
}

/// Pagination state threaded through one workflow execution.
///
/// Re-derived from config at workflow start, replaced on every page, and
/// discarded when the execution ends; never persisted on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncCursor {
    pub next_page_token: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// Config produced by the prepare activity and threaded through every page
/// fetch of the execution.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub project_id: Uuid,
    pub tracker_base_url: String,
    pub tracker_email: String,
    pub tracker_api_token: String,
    /// Remote accounts whose activity is synced; empty means nothing to do.
    pub account_ids: Vec<String>,
    /// Lower bound for the incremental window; `None` on full resyncs.
    pub since: Option<DateTime<Utc>>,
    pub page_size: u32,
}

/// Result of one page-fetch activity invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPageResult {
    pub has_more: bool,
    pub next_page_token: Option<String>,
    /// Most recent remote update timestamp seen on this page.
    pub last_updated_at: Option<DateTime<Utc>>,
    pub issues_upserted: u64,
    pub comments_upserted: u64,
    pub worklogs_upserted: u64,
}

#[cfg(test)]
pub(crate) mod test_support;
