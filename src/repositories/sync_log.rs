//! SyncLog repository.
//!
//! Append-only: the core only ever inserts and reads; retention is someone
//! else's problem.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::sync_log::{ActiveModel, Column, Entity, Model};

pub struct SyncLogRepository {
    db: DatabaseConnection,
}

impl SyncLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn append(
        &self,
        project_id: Uuid,
        level: &str,
        message: &str,
        detail: Option<JsonValue>,
    ) -> Result<Model, DbErr> {
        let entry = ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            level: Set(level.to_string()),
            message: Set(message.to_string()),
            detail: Set(detail),
            created_at: Set(Utc::now().fixed_offset()),
        };

        entry.insert(&self.db).await
    }

    /// Most recent entries first.
    pub async fn recent(&self, project_id: Uuid, limit: u64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }
}
