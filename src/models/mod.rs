//! SeaORM entity models for the tracksync store.

pub mod issue;
pub mod issue_comment;
pub mod issue_worklog;
pub mod project;
pub mod sync_job;
pub mod sync_log;
pub mod sync_state;
