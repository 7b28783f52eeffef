//! Orchestration-level error handling.
//!
//! Configuration errors (missing project or job) are hard failures; engine
//! and database errors propagate untouched except for the one documented
//! idempotency case ("schedule already exists" on creation, swallowed by
//! the schedule manager).

use thiserror::Error;
use uuid::Uuid;

use crate::engine::EngineError;
use crate::jira::JiraError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("sync job for project {0} not found")]
    SyncJobNotFound(Uuid),

    #[error("workflow engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("tracker error: {0}")]
    Tracker(#[from] JiraError),
}

pub type Result<T> = std::result::Result<T, Error>;
