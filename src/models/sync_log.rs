//! SyncLog entity model.
//!
//! Append-only audit trail of sync lifecycle events. Rows are never mutated
//! or deleted by the orchestration core.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const LEVEL_INFO: &str = "info";
pub const LEVEL_ERROR: &str = "error";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    pub level: String,

    pub message: String,

    /// Structured detail payload (classification, cadence, parameters)
    #[sea_orm(column_type = "JsonBinary")]
    pub detail: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
