//! Schedule lifecycle management.
//!
//! Owns the mapping project → (workflow id, schedule id, cron, status) and
//! drives creation, pause/resume, reschedule, manual trigger, and next-run
//! refresh against the workflow engine. Workflow and schedule ids derive
//! deterministically from the project id, which is also what makes creation
//! idempotent and scheduled runs mutually exclusive per project.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{
    CreateScheduleRequest, EngineError, ScheduleSpec, StartWorkflowOptions, WorkflowEngine,
    parse_cron,
};
use crate::error::{Error, Result};
use crate::models::sync_job::{self, STATUS_ACTIVE, STATUS_PAUSED};
use crate::models::sync_log::LEVEL_INFO;
use crate::repositories::project::ProjectRepository;
use crate::repositories::sync_job::{NewSyncJob, SyncJobRepository};
use crate::repositories::sync_log::SyncLogRepository;
use crate::repositories::sync_state::SyncStateRepository;
use crate::sync::SyncWorkflowInput;

/// Deterministic workflow id for a project's recurring sync.
pub fn workflow_id_for(project_id: Uuid) -> String {
    format!("project-sync-{project_id}")
}

/// Deterministic schedule id for a project's recurring sync.
pub fn schedule_id_for(project_id: Uuid) -> String {
    format!("project-sync-schedule-{project_id}")
}

/// Parameters for a manually triggered run.
#[derive(Debug, Clone, Default)]
pub struct ManualSyncOptions {
    pub full_resync: bool,
    pub account_ids: Option<Vec<String>>,
}

pub struct ScheduleManager {
    engine: Arc<dyn WorkflowEngine>,
    projects: ProjectRepository,
    jobs: SyncJobRepository,
    states: SyncStateRepository,
    logs: SyncLogRepository,
    default_cron: String,
}

impl ScheduleManager {
    pub fn new(
        db: DatabaseConnection,
        engine: Arc<dyn WorkflowEngine>,
        default_cron: String,
    ) -> Self {
        Self {
            engine,
            projects: ProjectRepository::new(db.clone()),
            jobs: SyncJobRepository::new(db.clone()),
            states: SyncStateRepository::new(db.clone()),
            logs: SyncLogRepository::new(db),
            default_cron,
        }
    }

    /// Ensure the project has a job row, per-entity state rows, and a
    /// schedule registered with the engine. Safe to call repeatedly; an
    /// "already exists" from the engine is treated as successful creation.
    pub async fn initialize(&self, project_id: Uuid) -> Result<sync_job::Model> {
        self.projects
            .find_by_id(project_id)
            .await?
            .ok_or(Error::ProjectNotFound(project_id))?;

        let job = self
            .jobs
            .create_if_absent(NewSyncJob {
                project_id,
                workflow_id: workflow_id_for(project_id),
                schedule_id: schedule_id_for(project_id),
                cron: self.default_cron.clone(),
                status: STATUS_ACTIVE.to_string(),
            })
            .await?;

        self.states.ensure_for_project(project_id).await?;

        let request = CreateScheduleRequest {
            schedule_id: job.schedule_id.clone(),
            spec: ScheduleSpec {
                cron: job.cron.clone(),
            },
            workflow_id: job.workflow_id.clone(),
            input: SyncWorkflowInput::scheduled(project_id),
        };

        match self.engine.create_schedule(request).await {
            Ok(()) => {
                info!(
                    project_id = %project_id,
                    schedule_id = %job.schedule_id,
                    cron = %job.cron,
                    "Registered sync schedule"
                );
            }
            Err(EngineError::ScheduleAlreadyExists(_)) => {
                debug!(
                    project_id = %project_id,
                    schedule_id = %job.schedule_id,
                    "Schedule already exists; treating creation as idempotent"
                );
            }
            Err(err) => return Err(err.into()),
        }

        self.refresh_next_run_time(project_id).await?;
        Ok(job)
    }

    /// Pause the schedule. Missing job is a hard error: there is nothing to
    /// pause and auto-creating a paused job would mask a caller bug.
    pub async fn pause(&self, project_id: Uuid) -> Result<()> {
        let job = self
            .jobs
            .find_by_project(project_id)
            .await?
            .ok_or(Error::SyncJobNotFound(project_id))?;

        self.engine
            .pause_schedule(&job.schedule_id, "paused by schedule manager")
            .await?;
        self.jobs.update_status(project_id, STATUS_PAUSED).await?;

        info!(project_id = %project_id, "Paused sync schedule");
        Ok(())
    }

    /// Resume the schedule, lazily initializing if the project was never
    /// scheduled before.
    pub async fn resume(&self, project_id: Uuid) -> Result<()> {
        let job = self.find_or_initialize(project_id).await?;

        match self
            .engine
            .unpause_schedule(&job.schedule_id, "resumed by schedule manager")
            .await
        {
            Ok(()) => {}
            Err(EngineError::ScheduleNotFound(_)) => {
                // Paused jobs are skipped at boot re-registration, so after a
                // restart the engine may not know this schedule yet.
                self.engine
                    .create_schedule(CreateScheduleRequest {
                        schedule_id: job.schedule_id.clone(),
                        spec: ScheduleSpec {
                            cron: job.cron.clone(),
                        },
                        workflow_id: job.workflow_id.clone(),
                        input: SyncWorkflowInput::scheduled(project_id),
                    })
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }

        self.jobs.update_status(project_id, STATUS_ACTIVE).await?;
        self.refresh_next_run_time(project_id).await?;

        info!(project_id = %project_id, "Resumed sync schedule");
        Ok(())
    }

    /// Change the cron cadence, read-modify-write against the engine's
    /// current schedule description.
    pub async fn reschedule(&self, project_id: Uuid, cron: &str) -> Result<()> {
        parse_cron(cron)?;

        let job = self.find_or_initialize(project_id).await?;
        let new_cron = cron.to_string();
        self.engine
            .update_schedule(
                &job.schedule_id,
                Box::new(move |spec| spec.cron = new_cron),
            )
            .await?;
        self.jobs.update_cron(project_id, cron).await?;
        self.refresh_next_run_time(project_id).await?;

        info!(project_id = %project_id, cron = %cron, "Rescheduled sync");
        Ok(())
    }

    /// Start a one-off run outside the recurring schedule.
    ///
    /// The workflow id gets a timestamp suffix so the run cannot collide
    /// with the schedule's own executions; a manual run racing a scheduled
    /// one is accepted because entity persistence is idempotent.
    pub async fn trigger_manual(
        &self,
        project_id: Uuid,
        options: ManualSyncOptions,
    ) -> Result<String> {
        let job = self.find_or_initialize(project_id).await?;

        let workflow_id = format!(
            "{}-manual-{}",
            job.workflow_id,
            Utc::now().timestamp_millis()
        );
        let input = SyncWorkflowInput {
            project_id,
            full_resync: options.full_resync,
            account_ids: options.account_ids.clone(),
        };

        self.engine
            .start_workflow(StartWorkflowOptions {
                workflow_id: workflow_id.clone(),
                input,
            })
            .await?;

        self.logs
            .append(
                project_id,
                LEVEL_INFO,
                "Manual sync triggered",
                Some(json!({
                    "workflow_id": workflow_id,
                    "full_resync": options.full_resync,
                    "account_ids": options.account_ids,
                })),
            )
            .await?;

        counter!("manual_sync_triggers_total").increment(1);
        info!(project_id = %project_id, workflow_id = %workflow_id, "Triggered manual sync");
        Ok(workflow_id)
    }

    /// Re-read the engine's upcoming fire times and persist the earliest
    /// strictly-future one (or null when the engine reports none).
    pub async fn refresh_next_run_time(&self, project_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let job = self
            .jobs
            .find_by_project(project_id)
            .await?
            .ok_or(Error::SyncJobNotFound(project_id))?;

        let description = self.engine.describe_schedule(&job.schedule_id).await?;
        let now = Utc::now();
        let next = description
            .next_action_times
            .into_iter()
            .filter(|t| *t > now)
            .min();

        self.jobs.update_next_run_at(project_id, next).await?;
        Ok(next)
    }

    async fn find_or_initialize(&self, project_id: Uuid) -> Result<sync_job::Model> {
        match self.jobs.find_by_project(project_id).await? {
            Some(job) => Ok(job),
            None => self.initialize(project_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sync_job, sync_log, sync_state};
    use crate::sync::test_support::{FakeEngine, seed_project, test_db};
    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

    async fn manager_with_engine() -> (ScheduleManager, Arc<FakeEngine>, sea_orm::DatabaseConnection)
    {
        let db = test_db().await;
        let engine = Arc::new(FakeEngine::default());
        let manager = ScheduleManager::new(db.clone(), engine.clone(), "*/15 * * * *".to_string());
        (manager, engine, db)
    }

    #[tokio::test]
    async fn initialize_creates_job_states_and_schedule() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;

        let job = manager.initialize(project_id).await.unwrap();
        assert_eq!(job.workflow_id, workflow_id_for(project_id));
        assert_eq!(job.schedule_id, schedule_id_for(project_id));
        assert_eq!(job.cron, "*/15 * * * *");
        assert_eq!(job.status, STATUS_ACTIVE);

        let states = sync_state::Entity::find()
            .filter(sync_state::Column::ProjectId.eq(project_id))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(states.len(), 3);

        assert!(engine.has_schedule(&schedule_id_for(project_id)).await);
    }

    #[tokio::test]
    async fn initialize_twice_is_idempotent() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;

        let first = manager.initialize(project_id).await.unwrap();
        let second = manager.initialize(project_id).await.unwrap();
        assert_eq!(first.id, second.id);

        let jobs = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(jobs, 1);

        let states = sync_state::Entity::find()
            .filter(sync_state::Column::ProjectId.eq(project_id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(states, 3);

        // One schedule, created once; the second attempt's "already exists"
        // was swallowed.
        assert_eq!(engine.create_calls().await, 2);
        assert!(engine.has_schedule(&schedule_id_for(project_id)).await);
    }

    #[tokio::test]
    async fn initialize_requires_project() {
        let (manager, _, _) = manager_with_engine().await;
        let err = manager.initialize(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn pause_on_missing_job_is_hard_error() {
        let (manager, _, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;

        let err = manager.pause(project_id).await.unwrap_err();
        assert!(matches!(err, Error::SyncJobNotFound(_)));
    }

    #[tokio::test]
    async fn pause_and_resume_round_trip() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;
        manager.initialize(project_id).await.unwrap();

        manager.pause(project_id).await.unwrap();
        let job = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, STATUS_PAUSED);
        assert!(engine.is_paused(&job.schedule_id).await);

        manager.resume(project_id).await.unwrap();
        let job = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, STATUS_ACTIVE);
        assert!(!engine.is_paused(&job.schedule_id).await);
    }

    #[tokio::test]
    async fn resume_recreates_schedule_lost_by_the_engine() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;

        // Job row exists (as after a restart) but the engine never saw the
        // schedule because the job was paused at boot.
        crate::repositories::sync_job::SyncJobRepository::new(db.clone())
            .create_if_absent(crate::repositories::sync_job::NewSyncJob {
                project_id,
                workflow_id: workflow_id_for(project_id),
                schedule_id: schedule_id_for(project_id),
                cron: "*/15 * * * *".to_string(),
                status: STATUS_PAUSED.to_string(),
            })
            .await
            .unwrap();
        assert!(!engine.has_schedule(&schedule_id_for(project_id)).await);

        manager.resume(project_id).await.unwrap();

        assert!(engine.has_schedule(&schedule_id_for(project_id)).await);
        let job = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, STATUS_ACTIVE);
    }

    #[tokio::test]
    async fn resume_lazily_initializes() {
        let (manager, _, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;

        manager.resume(project_id).await.unwrap();
        let job = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .one(&db)
            .await
            .unwrap();
        assert!(job.is_some());
    }

    #[tokio::test]
    async fn reschedule_updates_engine_and_row() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;
        manager.initialize(project_id).await.unwrap();

        manager.reschedule(project_id, "0 */6 * * *").await.unwrap();

        let job = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.cron, "0 */6 * * *");
        assert_eq!(
            engine.schedule_cron(&job.schedule_id).await.as_deref(),
            Some("0 */6 * * *")
        );
    }

    #[tokio::test]
    async fn reschedule_rejects_invalid_cron_before_engine() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;

        let err = manager.reschedule(project_id, "nope").await.unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::InvalidCron { .. })));
        // Validation failed before anything was created.
        assert_eq!(engine.create_calls().await, 0);
    }

    #[tokio::test]
    async fn trigger_manual_uniquifies_workflow_id_and_logs() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;

        let workflow_id = manager
            .trigger_manual(
                project_id,
                ManualSyncOptions {
                    full_resync: true,
                    account_ids: Some(vec!["acc-9".to_string()]),
                },
            )
            .await
            .unwrap();

        let base = workflow_id_for(project_id);
        assert!(workflow_id.starts_with(&format!("{base}-manual-")));

        let started = engine.started_workflows().await;
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].workflow_id, workflow_id);
        assert!(started[0].input.full_resync);
        assert_eq!(
            started[0].input.account_ids,
            Some(vec!["acc-9".to_string()])
        );

        let logs = sync_log::Entity::find()
            .filter(sync_log::Column::ProjectId.eq(project_id))
            .all(&db)
            .await
            .unwrap();
        assert!(
            logs.iter()
                .any(|entry| entry.message == "Manual sync triggered")
        );
    }

    #[tokio::test]
    async fn refresh_next_run_filters_past_times() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;
        manager.initialize(project_id).await.unwrap();

        let past = Utc::now() - chrono::Duration::minutes(10);
        let soon = Utc::now() + chrono::Duration::minutes(5);
        let later = Utc::now() + chrono::Duration::minutes(20);
        engine.set_next_action_times(vec![past, later, soon]).await;

        let next = manager.refresh_next_run_time(project_id).await.unwrap();
        assert_eq!(next, Some(soon));

        let job = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let persisted = job.next_run_at.unwrap().with_timezone(&Utc);
        assert!((persisted - soon).num_seconds().abs() <= 1);
    }

    #[tokio::test]
    async fn refresh_next_run_persists_null_when_engine_reports_none() {
        let (manager, engine, db) = manager_with_engine().await;
        let project_id = seed_project(&db, &["acc-1"]).await;
        manager.initialize(project_id).await.unwrap();

        engine.set_next_action_times(Vec::new()).await;
        let next = manager.refresh_next_run_time(project_id).await.unwrap();
        assert_eq!(next, None);

        let job = sync_job::Entity::find()
            .filter(sync_job::Column::ProjectId.eq(project_id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(job.next_run_at.is_none());
    }
}
