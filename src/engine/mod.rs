//! Durable workflow engine binding.
//!
//! The orchestration core talks to a narrow [`WorkflowEngine`] trait:
//! named cron schedules that start workflow executions, with the engine
//! guaranteeing at most one concurrent execution per workflow id. The
//! bundled [`local::LocalEngine`] realizes the contract in-process; any
//! equivalent durable-execution or job-queue system can substitute.
//!
//! Activity semantics (per-call timeout, bounded retry with exponential
//! backoff) live here too, in [`run_activity`], so workflows never carry
//! retry logic of their own.

pub mod local;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::sync::SyncWorkflowInput;

/// Errors surfaced by the workflow engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("schedule '{0}' already exists")]
    ScheduleAlreadyExists(String),
    #[error("schedule '{0}' not found")]
    ScheduleNotFound(String),
    #[error("workflow '{0}' already has a running execution")]
    WorkflowAlreadyRunning(String),
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("no workflow runner registered with the engine")]
    RunnerNotRegistered,
}

/// Mutable portion of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub cron: String,
}

/// Snapshot of a schedule as the engine sees it.
#[derive(Debug, Clone)]
pub struct ScheduleDescription {
    pub schedule_id: String,
    pub spec: ScheduleSpec,
    pub paused: bool,
    /// Upcoming fire times, earliest first; empty while paused.
    pub next_action_times: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateScheduleRequest {
    pub schedule_id: String,
    pub spec: ScheduleSpec,
    pub workflow_id: String,
    pub input: SyncWorkflowInput,
}

#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    pub workflow_id: String,
    pub input: SyncWorkflowInput,
}

/// Read-modify-write mutation applied to a schedule's spec.
pub type ScheduleMutator = Box<dyn FnOnce(&mut ScheduleSpec) + Send>;

/// Narrow engine contract the schedule manager depends on.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn create_schedule(&self, request: CreateScheduleRequest) -> Result<(), EngineError>;

    async fn pause_schedule(&self, schedule_id: &str, note: &str) -> Result<(), EngineError>;

    async fn unpause_schedule(&self, schedule_id: &str, note: &str) -> Result<(), EngineError>;

    async fn update_schedule(
        &self,
        schedule_id: &str,
        mutate: ScheduleMutator,
    ) -> Result<(), EngineError>;

    async fn describe_schedule(&self, schedule_id: &str)
    -> Result<ScheduleDescription, EngineError>;

    /// Start a one-off workflow execution outside any schedule.
    async fn start_workflow(&self, options: StartWorkflowOptions) -> Result<(), EngineError>;
}

/// Executes one workflow run on behalf of the engine.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn execute(&self, workflow_id: &str, input: SyncWorkflowInput) -> anyhow::Result<()>;
}

/// Parse a cron expression, accepting the common 5-field form.
///
/// The cron crate requires a seconds field; 5-field specs get seconds pinned
/// to zero.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, EngineError> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    cron::Schedule::from_str(&normalized).map_err(|err| EngineError::InvalidCron {
        expr: expr.to_string(),
        reason: err.to_string(),
    })
}

/// Failure contract activities must satisfy so the retry wrapper can decide
/// whether another attempt is worthwhile.
pub trait ActivityFailure: std::error::Error {
    fn retryable(&self) -> bool;

    /// Retry delay hinted by the remote (e.g. a Retry-After header).
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Construct the failure representing an exceeded start-to-close timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Per-activity execution policy.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Start-to-close timeout applied to each attempt.
    pub start_to_close: Duration,
    /// Attempt ceiling, counting the first attempt.
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub retry_jitter_factor: f64,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(120),
            max_attempts: 3,
            retry_base: Duration::from_secs(5),
            retry_max: Duration::from_secs(300),
            retry_jitter_factor: 0.1,
        }
    }
}

/// Run one activity under the engine's retry policy.
///
/// Retries only while the failure is retryable and attempts remain;
/// non-retryable failures surface immediately.
pub async fn run_activity<T, E, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    mut activity: F,
) -> Result<T, E>
where
    E: ActivityFailure,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        let outcome = match timeout(options.start_to_close, activity()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(options.start_to_close)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if !err.retryable() => {
                warn!(
                    activity = name,
                    attempt,
                    error = %err,
                    "Activity failed with non-retryable error"
                );
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(
                    activity = name,
                    attempt,
                    error = %err,
                    "Activity exhausted its retry attempts"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = retry_delay(options, attempt - 1, err.retry_after());
                warn!(
                    activity = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Activity failed; retrying"
                );
                metrics::counter!("activity_retries_total", "activity" => name.to_string())
                    .increment(1);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn retry_delay(
    options: &ActivityOptions,
    prior_failures: u32,
    retry_after: Option<Duration>,
) -> Duration {
    let base = options.retry_base.as_secs_f64();
    let max = options.retry_max.as_secs_f64();
    let mut backoff = (base * 2_f64.powi(prior_failures.min(i32::MAX as u32) as i32)).min(max);

    if let Some(hint) = retry_after {
        backoff = backoff.max(hint.as_secs_f64());
    }

    let jitter = if options.retry_jitter_factor > 0.0 && backoff > 0.0 {
        rand::thread_rng().gen_range(0.0..(options.retry_jitter_factor * backoff))
    } else {
        0.0
    };

    Duration::from_secs_f64(backoff + jitter)
}
