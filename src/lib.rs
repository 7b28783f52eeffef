//! # tracksync
//!
//! Periodic synchronization of tracker data (issues, comments, worklogs)
//! into a local store, on a per-project cron cadence, with durable
//! execution, paginated fetches, and adaptive backoff when the remote
//! degrades.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod jira;
pub mod logging;
pub mod models;
pub mod notify;
pub mod repositories;
pub mod runtime;
pub mod sync;
pub use migration;
