//! Issue entity model.
//!
//! Synced tracker issues, keyed by (project_id, remote_id) for idempotent
//! page re-delivery.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "issues")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    /// Tracker-side issue id
    pub remote_id: String,

    /// Tracker-side issue key (e.g. `ACME-123`)
    pub issue_key: String,

    pub summary: Option<String>,

    pub status: Option<String>,

    pub assignee_account_id: Option<String>,

    /// Last update timestamp reported by the tracker
    pub remote_updated_at: Option<DateTimeWithTimeZone>,

    /// Normalized issue payload
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
