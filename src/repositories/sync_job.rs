//! SyncJob repository.
//!
//! One row per project; creation is race-tolerant (a lost insert race is
//! resolved by re-reading the winner's row) and every mutation is a
//! single-row update keyed by project id.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use tracing::debug;
use uuid::Uuid;

use super::is_unique_violation;
use crate::models::sync_job::{ActiveModel, Column, Entity, Model, STATUS_PAUSED};

/// Fields required to create a job row.
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    pub project_id: Uuid,
    pub workflow_id: String,
    pub schedule_id: String,
    pub cron: String,
    pub status: String,
}

pub struct SyncJobRepository {
    db: DatabaseConnection,
}

impl SyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_project(&self, project_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .one(&self.db)
            .await
    }

    /// Create the job row if no row exists for the project yet.
    ///
    /// A concurrent creation race is tolerated: on a unique violation the
    /// winner's row is returned.
    pub async fn create_if_absent(&self, new_job: NewSyncJob) -> Result<Model, DbErr> {
        if let Some(existing) = self.find_by_project(new_job.project_id).await? {
            return Ok(existing);
        }

        let now = Utc::now().fixed_offset();
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(new_job.project_id),
            workflow_id: Set(new_job.workflow_id),
            schedule_id: Set(new_job.schedule_id),
            cron: Set(new_job.cron),
            status: Set(new_job.status),
            last_run_at: Set(None),
            next_run_at: Set(None),
            backoff_level: Set(0),
            backoff_original_cron: Set(None),
            backoff_notified_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match model.insert(&self.db).await {
            Ok(inserted) => {
                debug!(project_id = %inserted.project_id, "Created sync job");
                Ok(inserted)
            }
            Err(err) if is_unique_violation(&err) => self
                .find_by_project(new_job.project_id)
                .await?
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    pub async fn update_status(&self, project_id: Uuid, status: &str) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn update_cron(&self, project_id: Uuid, cron: &str) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(Column::Cron, Expr::value(cron))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn update_next_run_at(
        &self,
        project_id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(
                Column::NextRunAt,
                Expr::value(next_run_at.map(|t| t.fixed_offset())),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn touch_last_run(
        &self,
        project_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(Column::LastRunAt, Expr::value(Some(at.fixed_offset())))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Persist an escalated backoff state: error status, new level, captured
    /// original cron, and (when an alert fired) the notification timestamp.
    pub async fn apply_backoff(
        &self,
        project_id: Uuid,
        level: i32,
        original_cron: &str,
        status: &str,
        notified_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbErr> {
        let mut update = Entity::update_many()
            .col_expr(Column::BackoffLevel, Expr::value(level))
            .col_expr(
                Column::BackoffOriginalCron,
                Expr::value(Some(original_cron)),
            )
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()));

        if let Some(at) = notified_at {
            update = update.col_expr(
                Column::BackoffNotifiedAt,
                Expr::value(Some(at.fixed_offset())),
            );
        }

        update
            .filter(Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Reset backoff state after a clean run.
    pub async fn clear_backoff(&self, project_id: Uuid, status: &str) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(Column::BackoffLevel, Expr::value(0))
            .col_expr(
                Column::BackoffOriginalCron,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                Column::BackoffNotifiedAt,
                Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None),
            )
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Jobs whose schedules should exist in the engine (everything not
    /// explicitly paused). Used for boot-time re-registration.
    pub async fn list_non_paused(&self) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Status.ne(STATUS_PAUSED))
            .all(&self.db)
            .await
    }
}
