//! Process-local workflow engine.
//!
//! Keeps cron schedules in memory, fires due executions from a tick loop,
//! and enforces the at-most-one-concurrent-execution-per-workflow-id
//! guarantee with an in-flight set. Manual starts bypass schedules but go
//! through the same in-flight gate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    CreateScheduleRequest, EngineError, ScheduleDescription, ScheduleMutator, ScheduleSpec,
    StartWorkflowOptions, WorkflowEngine, WorkflowRunner, parse_cron,
};
use crate::sync::SyncWorkflowInput;

/// How many upcoming fire times a describe call reports.
const DESCRIBE_ACTION_TIMES: usize = 5;

struct ScheduleEntry {
    spec: ScheduleSpec,
    schedule: cron::Schedule,
    workflow_id: String,
    input: SyncWorkflowInput,
    paused: bool,
    next_fire: Option<DateTime<Utc>>,
}

/// In-process [`WorkflowEngine`] implementation.
pub struct LocalEngine {
    tick_interval: TokioDuration,
    schedules: RwLock<HashMap<String, ScheduleEntry>>,
    running: Arc<Mutex<HashSet<String>>>,
    runner: OnceLock<Arc<dyn WorkflowRunner>>,
}

impl LocalEngine {
    pub fn new(tick_interval: std::time::Duration) -> Self {
        Self {
            tick_interval: TokioDuration::from_millis(tick_interval.as_millis() as u64),
            schedules: RwLock::new(HashMap::new()),
            running: Arc::new(Mutex::new(HashSet::new())),
            runner: OnceLock::new(),
        }
    }

    /// Register the workflow runner. One-time wiring at process start.
    pub fn register_runner(&self, runner: Arc<dyn WorkflowRunner>) {
        if self.runner.set(runner).is_err() {
            warn!("Workflow runner already registered; ignoring replacement");
        }
    }

    /// Run the tick loop until the shutdown token fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Starting local workflow engine"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Local workflow engine shutdown requested");
                    break;
                }
                _ = sleep(self.tick_interval) => {
                    self.tick().await;
                }
            }
        }

        info!("Local workflow engine stopped");
    }

    /// Evaluate schedules once and launch every due execution.
    pub async fn tick(&self) {
        let now = Utc::now();
        let mut due = Vec::new();

        {
            let mut schedules = self.schedules.write().await;
            for (schedule_id, entry) in schedules.iter_mut() {
                if entry.paused {
                    continue;
                }
                let Some(next_fire) = entry.next_fire else {
                    continue;
                };
                if next_fire <= now {
                    due.push((
                        schedule_id.clone(),
                        entry.workflow_id.clone(),
                        entry.input.clone(),
                    ));
                    entry.next_fire = entry.schedule.after(&now).next();
                }
            }
        }

        for (schedule_id, workflow_id, input) in due {
            match self.spawn_execution(workflow_id.clone(), input).await {
                Ok(()) => {
                    counter!("engine_scheduled_starts_total").increment(1);
                    debug!(
                        schedule_id = %schedule_id,
                        workflow_id = %workflow_id,
                        "Schedule fired"
                    );
                }
                Err(EngineError::WorkflowAlreadyRunning(_)) => {
                    counter!("engine_overlap_skips_total").increment(1);
                    warn!(
                        schedule_id = %schedule_id,
                        workflow_id = %workflow_id,
                        "Previous execution still running; skipping scheduled start"
                    );
                }
                Err(err) => {
                    error!(
                        schedule_id = %schedule_id,
                        workflow_id = %workflow_id,
                        error = %err,
                        "Failed to start scheduled execution"
                    );
                }
            }
        }
    }

    async fn spawn_execution(
        &self,
        workflow_id: String,
        input: SyncWorkflowInput,
    ) -> Result<(), EngineError> {
        let runner = self
            .runner
            .get()
            .cloned()
            .ok_or(EngineError::RunnerNotRegistered)?;

        {
            let mut running = self.running.lock().await;
            if !running.insert(workflow_id.clone()) {
                return Err(EngineError::WorkflowAlreadyRunning(workflow_id));
            }
        }

        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let result = runner.execute(&workflow_id, input).await;
            running.lock().await.remove(&workflow_id);

            match result {
                Ok(()) => {
                    debug!(workflow_id = %workflow_id, "Workflow execution completed");
                }
                Err(err) => {
                    counter!("engine_failed_executions_total").increment(1);
                    error!(
                        workflow_id = %workflow_id,
                        error = %err,
                        "Workflow execution failed"
                    );
                }
            }
        });

        Ok(())
    }

    /// Whether the given workflow id currently has a running execution.
    pub async fn is_running(&self, workflow_id: &str) -> bool {
        self.running.lock().await.contains(workflow_id)
    }

    /// Wait until no executions are in flight. Test and CLI helper.
    pub async fn wait_until_idle(&self) {
        loop {
            if self.running.lock().await.is_empty() {
                return;
            }
            sleep(TokioDuration::from_millis(20)).await;
        }
    }
}

#[async_trait]
impl WorkflowEngine for LocalEngine {
    async fn create_schedule(&self, request: CreateScheduleRequest) -> Result<(), EngineError> {
        let schedule = parse_cron(&request.spec.cron)?;
        let mut schedules = self.schedules.write().await;

        if schedules.contains_key(&request.schedule_id) {
            return Err(EngineError::ScheduleAlreadyExists(request.schedule_id));
        }

        let next_fire = schedule.upcoming(Utc).next();
        info!(
            schedule_id = %request.schedule_id,
            workflow_id = %request.workflow_id,
            cron = %request.spec.cron,
            next_fire = ?next_fire,
            "Created schedule"
        );

        schedules.insert(
            request.schedule_id,
            ScheduleEntry {
                spec: request.spec,
                schedule,
                workflow_id: request.workflow_id,
                input: request.input,
                paused: false,
                next_fire,
            },
        );

        Ok(())
    }

    async fn pause_schedule(&self, schedule_id: &str, note: &str) -> Result<(), EngineError> {
        let mut schedules = self.schedules.write().await;
        let entry = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;

        entry.paused = true;
        info!(schedule_id = %schedule_id, note = %note, "Paused schedule");
        Ok(())
    }

    async fn unpause_schedule(&self, schedule_id: &str, note: &str) -> Result<(), EngineError> {
        let mut schedules = self.schedules.write().await;
        let entry = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;

        entry.paused = false;
        entry.next_fire = entry.schedule.upcoming(Utc).next();
        info!(schedule_id = %schedule_id, note = %note, "Unpaused schedule");
        Ok(())
    }

    async fn update_schedule(
        &self,
        schedule_id: &str,
        mutate: ScheduleMutator,
    ) -> Result<(), EngineError> {
        let mut schedules = self.schedules.write().await;
        let entry = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;

        let mut spec = entry.spec.clone();
        mutate(&mut spec);
        let schedule = parse_cron(&spec.cron)?;

        info!(
            schedule_id = %schedule_id,
            old_cron = %entry.spec.cron,
            new_cron = %spec.cron,
            "Updated schedule spec"
        );

        entry.schedule = schedule;
        entry.spec = spec;
        if !entry.paused {
            entry.next_fire = entry.schedule.upcoming(Utc).next();
        }
        Ok(())
    }

    async fn describe_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<ScheduleDescription, EngineError> {
        let schedules = self.schedules.read().await;
        let entry = schedules
            .get(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;

        let next_action_times = if entry.paused {
            Vec::new()
        } else {
            entry
                .schedule
                .upcoming(Utc)
                .take(DESCRIBE_ACTION_TIMES)
                .collect()
        };

        Ok(ScheduleDescription {
            schedule_id: schedule_id.to_string(),
            spec: entry.spec.clone(),
            paused: entry.paused,
            next_action_times,
        })
    }

    async fn start_workflow(&self, options: StartWorkflowOptions) -> Result<(), EngineError> {
        self.spawn_execution(options.workflow_id, options.input)
            .await
    }
}
