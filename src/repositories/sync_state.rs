//! SyncState repository.
//!
//! One row per (project, entity). Creation is an idempotent upsert: the
//! unique (project_id, entity) guard turns duplicate creation into a no-op.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use super::is_unique_violation;
use crate::models::sync_state::{ActiveModel, Column, Entity, Model};
use crate::sync::EntityKind;

pub const STATE_PENDING: &str = "pending";
pub const STATE_OK: &str = "ok";

pub struct SyncStateRepository {
    db: DatabaseConnection,
}

impl SyncStateRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Ensure a state row exists for every tracked entity of the project.
    ///
    /// Existing rows are left untouched.
    pub async fn ensure_for_project(&self, project_id: Uuid) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();

        for entity in EntityKind::ALL {
            let model = ActiveModel {
                id: Set(Uuid::new_v4()),
                project_id: Set(project_id),
                entity: Set(entity.as_str().to_string()),
                last_synced_at: Set(None),
                status: Set(STATE_PENDING.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            };

            match model.insert(&self.db).await {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .all(&self.db)
            .await
    }

    /// Lower bound for the incremental sync window.
    ///
    /// Returns `None` when any tracked entity has never synced, forcing a
    /// full window rather than silently skipping its history.
    pub async fn min_last_synced_at(
        &self,
        project_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DbErr> {
        let states = self.list_for_project(project_id).await?;
        if states.is_empty() {
            return Ok(None);
        }

        let mut min: Option<DateTime<Utc>> = None;
        for state in states {
            match state.last_synced_at {
                None => return Ok(None),
                Some(at) => {
                    let at = at.with_timezone(&Utc);
                    min = Some(min.map_or(at, |current| current.min(at)));
                }
            }
        }

        Ok(min)
    }

    /// Record a successful sync pass for every tracked entity.
    pub async fn mark_synced(
        &self,
        project_id: Uuid,
        synced_through: Option<DateTime<Utc>>,
    ) -> Result<(), DbErr> {
        let mut update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATE_OK))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()));

        if let Some(through) = synced_through {
            update = update.col_expr(
                Column::LastSyncedAt,
                Expr::value(Some(through.fixed_offset())),
            );
        }

        update
            .filter(Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
