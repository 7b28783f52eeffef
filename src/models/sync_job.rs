//! SyncJob entity model.
//!
//! One row per project, mapping the project to its workflow/schedule
//! identifiers in the workflow engine plus the current cadence and backoff
//! state. Rows are never hard-deleted; a retired job is paused instead.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Job is scheduled and healthy.
pub const STATUS_ACTIVE: &str = "active";
/// Schedule is paused; no executions fire.
pub const STATUS_PAUSED: &str = "paused";
/// Last terminal run failed; cadence may be backed off.
pub const STATUS_ERROR: &str = "error";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning project; exactly one job per project
    #[sea_orm(unique)]
    pub project_id: Uuid,

    /// Workflow id registered with the engine; derived from the project id
    /// and immutable once created
    pub workflow_id: String,

    /// Schedule id registered with the engine; derived from the project id
    /// and immutable once created
    pub schedule_id: String,

    /// Current cron cadence driving the schedule
    pub cron: String,

    /// Job status: active, paused, or error
    pub status: String,

    /// Timestamp of the most recent execution start
    pub last_run_at: Option<DateTimeWithTimeZone>,

    /// Cached next fire time reported by the engine
    pub next_run_at: Option<DateTimeWithTimeZone>,

    /// Index into the backoff ladder; 0 means the original cadence
    pub backoff_level: i32,

    /// Cron captured at the first escalation, restored on the next clean run
    pub backoff_original_cron: Option<String>,

    /// When the last escalation alert was dispatched
    pub backoff_notified_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
