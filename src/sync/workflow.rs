//! Sync workflow control loop.
//!
//! PREPARING → PAGINATING (looping) → FINALIZING_SUCCESS or
//! FINALIZING_FAILURE, terminal. The workflow carries no retry logic of its
//! own: every activity invocation goes through the engine's retry wrapper,
//! and only after an invocation exhausts its attempts does the workflow take
//! the failure transition, reporting through the failure activity and then
//! re-raising so the engine records the execution itself as failed.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::{ActivityOptions, WorkflowRunner, run_activity};
use crate::sync::activities::{ActivityError, SyncActivities};
use crate::sync::{SyncCursor, SyncWorkflowInput};

/// Terminal outcome of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No tracked accounts configured; the pagination loop never ran.
    NothingToSync,
    Completed {
        pages: u32,
        issues: u64,
        comments: u64,
        worklogs: u64,
    },
}

/// Terminal failure re-raised to the engine after the failure activity ran.
#[derive(Debug, thiserror::Error)]
#[error("sync workflow for project {project_id} failed: {source}")]
pub struct WorkflowFailure {
    pub project_id: Uuid,
    #[source]
    pub source: ActivityError,
}

pub struct SyncWorkflow<A: SyncActivities> {
    activities: Arc<A>,
    activity_options: ActivityOptions,
}

impl<A: SyncActivities> SyncWorkflow<A> {
    pub fn new(activities: Arc<A>, activity_options: ActivityOptions) -> Self {
        Self {
            activities,
            activity_options,
        }
    }

    pub async fn run(&self, input: SyncWorkflowInput) -> Result<SyncOutcome, WorkflowFailure> {
        let project_id = input.project_id;
        counter!("sync_workflow_runs_total").increment(1);

        // PREPARING
        let config = match run_activity("prepare", &self.activity_options, || {
            self.activities.prepare(&input)
        })
        .await
        {
            Ok(config) => config,
            Err(err) => return Err(self.finalize_failure(project_id, err).await),
        };

        if config.account_ids.is_empty() {
            info!(project_id = %project_id, "No tracked accounts configured; nothing to sync");
            let message = "Nothing to sync: no tracked accounts configured";
            if let Err(err) = run_activity("finalize", &self.activity_options, || {
                self.activities.finalize(project_id, config.since, message)
            })
            .await
            {
                return Err(self.finalize_failure(project_id, err).await);
            }
            return Ok(SyncOutcome::NothingToSync);
        }

        // PAGINATING
        let mut cursor = SyncCursor {
            next_page_token: None,
            since: config.since,
            last_updated_at: None,
        };
        let mut pages: u32 = 0;
        let mut issues: u64 = 0;
        let mut comments: u64 = 0;
        let mut worklogs: u64 = 0;

        loop {
            let page = match run_activity("fetch_page", &self.activity_options, || {
                self.activities.fetch_page(&config, &cursor)
            })
            .await
            {
                Ok(page) => page,
                Err(err) => return Err(self.finalize_failure(project_id, err).await),
            };

            pages += 1;
            issues += page.issues_upserted;
            comments += page.comments_upserted;
            worklogs += page.worklogs_upserted;

            // The cursor is replaced wholesale each iteration: token from
            // the result, since held from config, last-updated advanced or
            // retained from the prior cursor.
            cursor = SyncCursor {
                next_page_token: page.next_page_token.clone(),
                since: config.since,
                last_updated_at: page.last_updated_at.or(cursor.last_updated_at),
            };

            if !page.has_more {
                break;
            }
        }

        // FINALIZING_SUCCESS
        let synced_through = cursor.last_updated_at.or(config.since);
        let message = format!(
            "Sync completed: {pages} page(s), {issues} issue(s), {comments} comment(s), {worklogs} worklog(s)"
        );
        if let Err(err) = run_activity("finalize", &self.activity_options, || {
            self.activities.finalize(project_id, synced_through, &message)
        })
        .await
        {
            return Err(self.finalize_failure(project_id, err).await);
        }

        Ok(SyncOutcome::Completed {
            pages,
            issues,
            comments,
            worklogs,
        })
    }

    /// FINALIZING_FAILURE: report through the failure activity, then hand
    /// the original error back for re-raising. A failure of the reporting
    /// activity itself is logged, not allowed to mask the original error.
    async fn finalize_failure(&self, project_id: Uuid, source: ActivityError) -> WorkflowFailure {
        counter!("sync_workflow_failures_total").increment(1);

        let classification = source.classification();
        let message = source.to_string();
        if let Err(report_err) = run_activity("record_failure", &self.activity_options, || {
            self.activities
                .record_failure(project_id, &classification, &message)
        })
        .await
        {
            error!(
                project_id = %project_id,
                error = %report_err,
                "Failed to record sync failure"
            );
        }

        WorkflowFailure { project_id, source }
    }
}

/// Adapter registering the sync workflow with the engine.
pub struct SyncWorkflowRunner<A: SyncActivities> {
    workflow: SyncWorkflow<A>,
}

impl<A: SyncActivities> SyncWorkflowRunner<A> {
    pub fn new(activities: Arc<A>, activity_options: ActivityOptions) -> Self {
        Self {
            workflow: SyncWorkflow::new(activities, activity_options),
        }
    }
}

#[async_trait]
impl<A: SyncActivities + 'static> WorkflowRunner for SyncWorkflowRunner<A> {
    async fn execute(&self, workflow_id: &str, input: SyncWorkflowInput) -> anyhow::Result<()> {
        info!(
            workflow_id = %workflow_id,
            project_id = %input.project_id,
            full_resync = input.full_resync,
            "Starting sync workflow execution"
        );

        match self.workflow.run(input).await {
            Ok(outcome) => {
                info!(
                    workflow_id = %workflow_id,
                    outcome = ?outcome,
                    "Sync workflow execution completed"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jira::{ErrorSeverity, JiraErrorClassification, JiraErrorCode};
    use crate::sync::{FetchPageResult, SyncConfig};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// One scripted page response: a result or a failure to raise.
    enum PageScript {
        Page(FetchPageResult),
        Fail { retryable: bool },
    }

    struct ScriptedActivities {
        account_ids: Vec<String>,
        since: Option<DateTime<Utc>>,
        pages: Mutex<VecDeque<PageScript>>,
        seen_cursors: Mutex<Vec<SyncCursor>>,
        finalized: Mutex<Vec<(Option<DateTime<Utc>>, String)>>,
        failures: Mutex<Vec<(JiraErrorClassification, String)>>,
    }

    impl ScriptedActivities {
        fn new(
            account_ids: Vec<String>,
            since: Option<DateTime<Utc>>,
            pages: Vec<PageScript>,
        ) -> Arc<Self> {
            Arc::new(Self {
                account_ids,
                since,
                pages: Mutex::new(pages.into()),
                seen_cursors: Mutex::new(Vec::new()),
                finalized: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SyncActivities for ScriptedActivities {
        async fn prepare(&self, input: &SyncWorkflowInput) -> Result<SyncConfig, ActivityError> {
            Ok(SyncConfig {
                project_id: input.project_id,
                tracker_base_url: "https://acme.atlassian.net".to_string(),
                tracker_email: "bot@acme.example".to_string(),
                tracker_api_token: "token".to_string(),
                account_ids: self.account_ids.clone(),
                since: self.since,
                page_size: 50,
            })
        }

        async fn fetch_page(
            &self,
            _config: &SyncConfig,
            cursor: &SyncCursor,
        ) -> Result<FetchPageResult, ActivityError> {
            self.seen_cursors.lock().await.push(cursor.clone());
            match self.pages.lock().await.pop_front() {
                Some(PageScript::Page(page)) => Ok(page),
                Some(PageScript::Fail { retryable }) => {
                    Err(ActivityError::Tracker(crate::jira::JiraError::new(
                        JiraErrorClassification::new(
                            if retryable {
                                JiraErrorCode::ServerError
                            } else {
                                JiraErrorCode::BadRequest
                            },
                            "scripted failure",
                            retryable,
                            ErrorSeverity::Error,
                        ),
                    )))
                }
                None => panic!("fetch_page called more times than scripted"),
            }
        }

        async fn finalize(
            &self,
            _project_id: Uuid,
            synced_through: Option<DateTime<Utc>>,
            message: &str,
        ) -> Result<(), ActivityError> {
            self.finalized
                .lock()
                .await
                .push((synced_through, message.to_string()));
            Ok(())
        }

        async fn record_failure(
            &self,
            _project_id: Uuid,
            classification: &JiraErrorClassification,
            message: &str,
        ) -> Result<(), ActivityError> {
            self.failures
                .lock()
                .await
                .push((classification.clone(), message.to_string()));
            Ok(())
        }
    }

    fn fast_options() -> ActivityOptions {
        ActivityOptions {
            start_to_close: Duration::from_millis(100),
            max_attempts: 2,
            retry_base: Duration::from_millis(1),
            retry_max: Duration::from_millis(2),
            retry_jitter_factor: 0.0,
        }
    }

    fn page(has_more: bool, token: Option<&str>, updated: Option<DateTime<Utc>>) -> PageScript {
        PageScript::Page(FetchPageResult {
            has_more,
            next_page_token: token.map(str::to_string),
            last_updated_at: updated,
            issues_upserted: 1,
            comments_upserted: 0,
            worklogs_upserted: 0,
        })
    }

    #[tokio::test]
    async fn paginates_until_exhausted_with_replaced_cursors() {
        let t1 = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 5, 1, 11, 0, 0).unwrap();

        let activities = ScriptedActivities::new(
            vec!["acc-1".to_string()],
            None,
            vec![
                page(true, Some("A"), Some(t1)),
                page(true, Some("B"), None),
                page(false, None, Some(t2)),
            ],
        );
        let workflow = SyncWorkflow::new(activities.clone(), fast_options());

        let outcome = workflow
            .run(SyncWorkflowInput::scheduled(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Completed {
                pages: 3,
                issues: 3,
                comments: 0,
                worklogs: 0,
            }
        );

        let cursors = activities.seen_cursors.lock().await;
        assert_eq!(cursors.len(), 3);
        assert_eq!(cursors[0].next_page_token, None);
        assert_eq!(cursors[1].next_page_token.as_deref(), Some("A"));
        assert_eq!(cursors[2].next_page_token.as_deref(), Some("B"));

        // Page 2 reported no last-updated value; the cursor retained page 1's.
        assert_eq!(cursors[2].last_updated_at, Some(t1));

        let finalized = activities.finalized.lock().await;
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].0, Some(t2));
        assert!(finalized[0].1.starts_with("Sync completed"));
    }

    #[tokio::test]
    async fn zero_tracked_accounts_short_circuits_to_success() {
        let since = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        let activities = ScriptedActivities::new(Vec::new(), Some(since), Vec::new());
        let workflow = SyncWorkflow::new(activities.clone(), fast_options());

        let outcome = workflow
            .run(SyncWorkflowInput::scheduled(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::NothingToSync);

        // The page-fetch activity was never invoked.
        assert!(activities.seen_cursors.lock().await.is_empty());

        let finalized = activities.finalized.lock().await;
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].0, Some(since));
        assert!(finalized[0].1.contains("Nothing to sync"));
    }

    #[tokio::test]
    async fn synced_through_falls_back_to_since() {
        let since = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        let activities = ScriptedActivities::new(
            vec!["acc-1".to_string()],
            Some(since),
            vec![page(false, None, None)],
        );
        let workflow = SyncWorkflow::new(activities.clone(), fast_options());

        workflow
            .run(SyncWorkflowInput::scheduled(Uuid::new_v4()))
            .await
            .unwrap();

        let finalized = activities.finalized.lock().await;
        assert_eq!(finalized[0].0, Some(since));
    }

    #[tokio::test]
    async fn non_retryable_failure_reports_and_reraises() {
        let project_id = Uuid::new_v4();
        let activities = ScriptedActivities::new(
            vec!["acc-1".to_string()],
            None,
            vec![PageScript::Fail { retryable: false }],
        );
        let workflow = SyncWorkflow::new(activities.clone(), fast_options());

        let err = workflow
            .run(SyncWorkflowInput::scheduled(project_id))
            .await
            .unwrap_err();
        assert_eq!(err.project_id, project_id);

        // One fetch attempt (non-retryable), failure activity invoked once,
        // no success finalize.
        assert_eq!(activities.seen_cursors.lock().await.len(), 1);
        let failures = activities.failures.lock().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.code, JiraErrorCode::BadRequest);
        assert!(activities.finalized.lock().await.is_empty());
    }

    #[tokio::test]
    async fn retryable_failure_exhausts_engine_attempts_first() {
        let activities = ScriptedActivities::new(
            vec!["acc-1".to_string()],
            None,
            vec![
                PageScript::Fail { retryable: true },
                PageScript::Fail { retryable: true },
            ],
        );
        let workflow = SyncWorkflow::new(activities.clone(), fast_options());

        workflow
            .run(SyncWorkflowInput::scheduled(Uuid::new_v4()))
            .await
            .unwrap_err();

        // max_attempts = 2: both scripted failures consumed before the
        // workflow took the failure transition.
        assert_eq!(activities.seen_cursors.lock().await.len(), 2);
        assert_eq!(activities.failures.lock().await.len(), 1);
    }
}
