//! Sync activities.
//!
//! The non-durable, retryable units the workflow drives: prepare the run
//! configuration, fetch and persist one page, finalize, or record failure.
//! Every persistence write is an upsert by remote id, so the engine may
//! redeliver an invocation with the same cursor without duplicating rows.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::ActivityFailure;
use crate::jira::{
    ErrorSeverity, JiraClient, JiraCredentials, JiraError, JiraErrorClassification, JiraErrorCode,
    RemoteIssue,
};
use crate::models::sync_log::LEVEL_INFO;
use crate::models::{issue, issue_comment, issue_worklog};
use crate::repositories::project::ProjectRepository;
use crate::repositories::sync_job::SyncJobRepository;
use crate::repositories::sync_log::SyncLogRepository;
use crate::repositories::sync_state::SyncStateRepository;
use crate::sync::backoff::{BackoffController, FailureReport};
use crate::sync::{FetchPageResult, SyncConfig, SyncCursor, SyncWorkflowInput};

/// Failure of one activity invocation.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("tracker request failed: {0}")]
    Tracker(#[from] JiraError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("activity timed out after {0:?}")]
    Timeout(Duration),
}

impl ActivityError {
    /// Classification embedded into sync logs and backoff decisions.
    ///
    /// Non-tracker failures map onto the `UNKNOWN` code with retryability
    /// matching the engine's retry policy for them.
    pub fn classification(&self) -> JiraErrorClassification {
        match self {
            ActivityError::Tracker(err) => err.classification.clone(),
            ActivityError::Database(err) => JiraErrorClassification::new(
                JiraErrorCode::Unknown,
                format!("database error: {err}"),
                true,
                ErrorSeverity::Error,
            ),
            ActivityError::Config(message) => JiraErrorClassification::new(
                JiraErrorCode::Unknown,
                message.clone(),
                false,
                ErrorSeverity::Error,
            ),
            ActivityError::Timeout(after) => JiraErrorClassification::new(
                JiraErrorCode::Unknown,
                format!("activity timed out after {after:?}"),
                true,
                ErrorSeverity::Error,
            ),
        }
    }
}

impl ActivityFailure for ActivityError {
    fn retryable(&self) -> bool {
        match self {
            ActivityError::Tracker(err) => err.retryable(),
            ActivityError::Database(_) => true,
            ActivityError::Config(_) => false,
            ActivityError::Timeout(_) => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ActivityError::Tracker(err) => err.retry_after_secs.map(Duration::from_secs),
            _ => None,
        }
    }

    fn timed_out(after: Duration) -> Self {
        ActivityError::Timeout(after)
    }
}

impl From<crate::error::Error> for ActivityError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Database(inner) => ActivityError::Database(inner),
            crate::error::Error::Tracker(inner) => ActivityError::Tracker(inner),
            other => ActivityError::Config(other.to_string()),
        }
    }
}

/// Activity contract the workflow drives. Mocked in workflow tests.
#[async_trait]
pub trait SyncActivities: Send + Sync {
    /// Resolve project credentials, tracked accounts, and the incremental
    /// window for this execution.
    async fn prepare(&self, input: &SyncWorkflowInput) -> Result<SyncConfig, ActivityError>;

    /// Fetch one page from the tracker and persist its entities.
    async fn fetch_page(
        &self,
        config: &SyncConfig,
        cursor: &SyncCursor,
    ) -> Result<FetchPageResult, ActivityError>;

    /// Record terminal success: advance sync state, append the audit entry,
    /// and restore any backed-off cadence.
    async fn finalize(
        &self,
        project_id: Uuid,
        synced_through: Option<DateTime<Utc>>,
        message: &str,
    ) -> Result<(), ActivityError>;

    /// Record terminal failure with the backoff controller.
    async fn record_failure(
        &self,
        project_id: Uuid,
        classification: &JiraErrorClassification,
        message: &str,
    ) -> Result<(), ActivityError>;
}

/// Production activities backed by the relational store and tracker client.
pub struct Activities {
    db: DatabaseConnection,
    backoff: Arc<BackoffController>,
    page_size: u32,
}

impl Activities {
    pub fn new(db: DatabaseConnection, backoff: Arc<BackoffController>, page_size: u32) -> Self {
        Self {
            db,
            backoff,
            page_size,
        }
    }
}

#[async_trait]
impl SyncActivities for Activities {
    async fn prepare(&self, input: &SyncWorkflowInput) -> Result<SyncConfig, ActivityError> {
        let project = ProjectRepository::new(self.db.clone())
            .find_by_id(input.project_id)
            .await?
            .ok_or_else(|| {
                ActivityError::Config(format!("project {} not found", input.project_id))
            })?;

        SyncJobRepository::new(self.db.clone())
            .touch_last_run(input.project_id, Utc::now())
            .await?;

        let account_ids = input
            .account_ids
            .clone()
            .filter(|ids| !ids.is_empty())
            .unwrap_or_else(|| project.account_ids());

        let since = if input.full_resync {
            None
        } else {
            SyncStateRepository::new(self.db.clone())
                .min_last_synced_at(input.project_id)
                .await?
        };

        info!(
            project_id = %input.project_id,
            accounts = account_ids.len(),
            since = ?since,
            full_resync = input.full_resync,
            "Prepared sync configuration"
        );

        Ok(SyncConfig {
            project_id: input.project_id,
            tracker_base_url: project.tracker_base_url,
            tracker_email: project.tracker_email,
            tracker_api_token: project.tracker_api_token,
            account_ids,
            since,
            page_size: self.page_size,
        })
    }

    async fn fetch_page(
        &self,
        config: &SyncConfig,
        cursor: &SyncCursor,
    ) -> Result<FetchPageResult, ActivityError> {
        let client = JiraClient::new(
            &config.tracker_base_url,
            JiraCredentials {
                email: config.tracker_email.clone(),
                api_token: config.tracker_api_token.clone(),
            },
        );

        let jql = build_jql(&config.account_ids, config.since);
        let timer = std::time::Instant::now();
        let page = client
            .search(&jql, config.page_size, cursor.next_page_token.as_deref())
            .await?;
        histogram!("sync_page_fetch_duration_ms").record(timer.elapsed().as_secs_f64() * 1_000.0);

        let tracked: HashSet<&str> = config.account_ids.iter().map(String::as_str).collect();
        let mut result = FetchPageResult {
            has_more: page.next_page_token.is_some(),
            next_page_token: page.next_page_token.clone(),
            ..FetchPageResult::default()
        };

        let txn = self.db.begin().await?;
        let now = Utc::now().fixed_offset();

        for remote in &page.issues {
            upsert_issue(&txn, config.project_id, remote, now).await?;
            result.issues_upserted += 1;

            if let Some(updated) = remote.updated {
                result.last_updated_at = Some(
                    result
                        .last_updated_at
                        .map_or(updated, |current| current.max(updated)),
                );
            }

            for comment in &remote.comments {
                let authored_by_tracked = comment
                    .author_account_id
                    .as_deref()
                    .is_some_and(|author| tracked.contains(author));
                if !authored_by_tracked {
                    continue;
                }
                upsert_comment(&txn, config.project_id, &remote.id, comment, now).await?;
                result.comments_upserted += 1;
            }

            for worklog in &remote.worklogs {
                let authored_by_tracked = worklog
                    .author_account_id
                    .as_deref()
                    .is_some_and(|author| tracked.contains(author));
                if !authored_by_tracked {
                    continue;
                }
                upsert_worklog(&txn, config.project_id, &remote.id, worklog, now).await?;
                result.worklogs_upserted += 1;
            }
        }

        txn.commit().await?;

        debug!(
            project_id = %config.project_id,
            issues = result.issues_upserted,
            comments = result.comments_upserted,
            worklogs = result.worklogs_upserted,
            has_more = result.has_more,
            "Persisted sync page"
        );

        Ok(result)
    }

    async fn finalize(
        &self,
        project_id: Uuid,
        synced_through: Option<DateTime<Utc>>,
        message: &str,
    ) -> Result<(), ActivityError> {
        SyncStateRepository::new(self.db.clone())
            .mark_synced(project_id, synced_through)
            .await?;

        SyncLogRepository::new(self.db.clone())
            .append(
                project_id,
                LEVEL_INFO,
                message,
                Some(json!({"synced_through": synced_through})),
            )
            .await?;

        self.backoff.record_success(project_id).await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        project_id: Uuid,
        classification: &JiraErrorClassification,
        message: &str,
    ) -> Result<(), ActivityError> {
        self.backoff
            .record_failure(FailureReport {
                project_id,
                classification,
                message,
                detail: None,
            })
            .await?;
        Ok(())
    }
}

/// JQL restricting the search to tracked accounts, optionally bounded by the
/// incremental window, ordered oldest-update first so the cursor's
/// last-updated watermark advances monotonically.
fn build_jql(account_ids: &[String], since: Option<DateTime<Utc>>) -> String {
    let accounts = account_ids
        .iter()
        .map(|id| format!("\"{id}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut jql = format!("(assignee in ({accounts}) OR reporter in ({accounts}))");
    if let Some(since) = since {
        jql.push_str(&format!(
            " AND updated >= \"{}\"",
            since.format("%Y-%m-%d %H:%M")
        ));
    }
    jql.push_str(" ORDER BY updated ASC");
    jql
}

async fn upsert_issue<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
    remote: &RemoteIssue,
    now: chrono::DateTime<chrono::FixedOffset>,
) -> Result<(), sea_orm::DbErr> {
    let payload = json!({
        "issue_id": remote.id,
        "issue_key": remote.key,
        "summary": remote.summary,
        "status": remote.status,
        "assignee_account_id": remote.assignee_account_id,
        "updated": remote.updated,
    });

    let model = issue::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        remote_id: Set(remote.id.clone()),
        issue_key: Set(remote.key.clone()),
        summary: Set(remote.summary.clone()),
        status: Set(remote.status.clone()),
        assignee_account_id: Set(remote.assignee_account_id.clone()),
        remote_updated_at: Set(remote.updated.map(|t| t.fixed_offset())),
        payload: Set(payload),
        created_at: Set(now),
        updated_at: Set(now),
    };

    issue::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([issue::Column::ProjectId, issue::Column::RemoteId])
                .update_columns([
                    issue::Column::IssueKey,
                    issue::Column::Summary,
                    issue::Column::Status,
                    issue::Column::AssigneeAccountId,
                    issue::Column::RemoteUpdatedAt,
                    issue::Column::Payload,
                    issue::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn upsert_comment<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
    issue_remote_id: &str,
    comment: &crate::jira::RemoteComment,
    now: chrono::DateTime<chrono::FixedOffset>,
) -> Result<(), sea_orm::DbErr> {
    let payload = json!({
        "comment_id": comment.id,
        "issue_id": issue_remote_id,
        "author_account_id": comment.author_account_id,
        "body": comment.body,
        "updated": comment.updated,
    });

    let model = issue_comment::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        issue_remote_id: Set(issue_remote_id.to_string()),
        remote_id: Set(comment.id.clone()),
        author_account_id: Set(comment.author_account_id.clone()),
        remote_updated_at: Set(comment.updated.map(|t| t.fixed_offset())),
        payload: Set(payload),
        created_at: Set(now),
        updated_at: Set(now),
    };

    issue_comment::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([
                issue_comment::Column::ProjectId,
                issue_comment::Column::RemoteId,
            ])
            .update_columns([
                issue_comment::Column::IssueRemoteId,
                issue_comment::Column::AuthorAccountId,
                issue_comment::Column::RemoteUpdatedAt,
                issue_comment::Column::Payload,
                issue_comment::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn upsert_worklog<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
    issue_remote_id: &str,
    worklog: &crate::jira::RemoteWorklog,
    now: chrono::DateTime<chrono::FixedOffset>,
) -> Result<(), sea_orm::DbErr> {
    let payload = json!({
        "worklog_id": worklog.id,
        "issue_id": issue_remote_id,
        "author_account_id": worklog.author_account_id,
        "time_spent_seconds": worklog.time_spent_seconds,
        "started": worklog.started,
        "updated": worklog.updated,
    });

    let model = issue_worklog::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        issue_remote_id: Set(issue_remote_id.to_string()),
        remote_id: Set(worklog.id.clone()),
        author_account_id: Set(worklog.author_account_id.clone()),
        time_spent_seconds: Set(worklog.time_spent_seconds),
        started_at: Set(worklog.started.map(|t| t.fixed_offset())),
        remote_updated_at: Set(worklog.updated.map(|t| t.fixed_offset())),
        payload: Set(payload),
        created_at: Set(now),
        updated_at: Set(now),
    };

    issue_worklog::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([
                issue_worklog::Column::ProjectId,
                issue_worklog::Column::RemoteId,
            ])
            .update_columns([
                issue_worklog::Column::IssueRemoteId,
                issue_worklog::Column::AuthorAccountId,
                issue_worklog::Column::TimeSpentSeconds,
                issue_worklog::Column::StartedAt,
                issue_worklog::Column::RemoteUpdatedAt,
                issue_worklog::Column::Payload,
                issue_worklog::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}
