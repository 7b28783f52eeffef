//! Shared fixtures for sync orchestration tests: an in-memory database with
//! migrations applied, a scriptable fake engine, and a recording notifier.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::engine::{
    CreateScheduleRequest, EngineError, ScheduleDescription, ScheduleMutator, ScheduleSpec,
    StartWorkflowOptions, WorkflowEngine, parse_cron,
};
use crate::models::project;
use crate::notify::{NotificationMessage, NotificationSender};

pub(crate) async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("create in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

pub(crate) async fn seed_project(db: &DatabaseConnection, account_ids: &[&str]) -> Uuid {
    let now = Utc::now().fixed_offset();
    let id = Uuid::new_v4();

    project::ActiveModel {
        id: Set(id),
        name: Set(format!("Project {id}")),
        tracker_base_url: Set("https://acme.atlassian.net".to_string()),
        tracker_email: Set("bot@acme.example".to_string()),
        tracker_api_token: Set("token".to_string()),
        tracked_account_ids: Set(serde_json::json!(account_ids)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert project");

    id
}

struct FakeSchedule {
    spec: ScheduleSpec,
    paused: bool,
}

/// In-memory engine double mirroring the contract's error semantics.
#[derive(Default)]
pub(crate) struct FakeEngine {
    schedules: Mutex<HashMap<String, FakeSchedule>>,
    started: Mutex<Vec<StartWorkflowOptions>>,
    /// When set, describe reports these times instead of computed ones.
    next_action_times: Mutex<Option<Vec<DateTime<Utc>>>>,
    create_calls: Mutex<usize>,
}

impl FakeEngine {
    pub(crate) async fn has_schedule(&self, schedule_id: &str) -> bool {
        self.schedules.lock().await.contains_key(schedule_id)
    }

    pub(crate) async fn is_paused(&self, schedule_id: &str) -> bool {
        self.schedules
            .lock()
            .await
            .get(schedule_id)
            .map(|schedule| schedule.paused)
            .unwrap_or(false)
    }

    pub(crate) async fn schedule_cron(&self, schedule_id: &str) -> Option<String> {
        self.schedules
            .lock()
            .await
            .get(schedule_id)
            .map(|schedule| schedule.spec.cron.clone())
    }

    pub(crate) async fn started_workflows(&self) -> Vec<StartWorkflowOptions> {
        self.started.lock().await.clone()
    }

    pub(crate) async fn set_next_action_times(&self, times: Vec<DateTime<Utc>>) {
        *self.next_action_times.lock().await = Some(times);
    }

    pub(crate) async fn create_calls(&self) -> usize {
        *self.create_calls.lock().await
    }
}

#[async_trait]
impl WorkflowEngine for FakeEngine {
    async fn create_schedule(&self, request: CreateScheduleRequest) -> Result<(), EngineError> {
        *self.create_calls.lock().await += 1;
        parse_cron(&request.spec.cron)?;

        let mut schedules = self.schedules.lock().await;
        if schedules.contains_key(&request.schedule_id) {
            return Err(EngineError::ScheduleAlreadyExists(request.schedule_id));
        }
        schedules.insert(
            request.schedule_id,
            FakeSchedule {
                spec: request.spec,
                paused: false,
            },
        );
        Ok(())
    }

    async fn pause_schedule(&self, schedule_id: &str, _note: &str) -> Result<(), EngineError> {
        let mut schedules = self.schedules.lock().await;
        let schedule = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;
        schedule.paused = true;
        Ok(())
    }

    async fn unpause_schedule(&self, schedule_id: &str, _note: &str) -> Result<(), EngineError> {
        let mut schedules = self.schedules.lock().await;
        let schedule = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;
        schedule.paused = false;
        Ok(())
    }

    async fn update_schedule(
        &self,
        schedule_id: &str,
        mutate: ScheduleMutator,
    ) -> Result<(), EngineError> {
        let mut schedules = self.schedules.lock().await;
        let schedule = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;

        let mut spec = schedule.spec.clone();
        mutate(&mut spec);
        parse_cron(&spec.cron)?;
        schedule.spec = spec;
        Ok(())
    }

    async fn describe_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<ScheduleDescription, EngineError> {
        let schedules = self.schedules.lock().await;
        let schedule = schedules
            .get(schedule_id)
            .ok_or_else(|| EngineError::ScheduleNotFound(schedule_id.to_string()))?;

        let next_action_times = if schedule.paused {
            Vec::new()
        } else if let Some(times) = self.next_action_times.lock().await.clone() {
            times
        } else {
            parse_cron(&schedule.spec.cron)?
                .upcoming(Utc)
                .take(5)
                .collect()
        };

        Ok(ScheduleDescription {
            schedule_id: schedule_id.to_string(),
            spec: schedule.spec.clone(),
            paused: schedule.paused,
            next_action_times,
        })
    }

    async fn start_workflow(&self, options: StartWorkflowOptions) -> Result<(), EngineError> {
        self.started.lock().await.push(options);
        Ok(())
    }
}

/// Notification double recording every dispatched message.
#[derive(Default)]
pub(crate) struct RecordingSender {
    sent: Mutex<Vec<NotificationMessage>>,
}

impl RecordingSender {
    pub(crate) async fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, message: &NotificationMessage) {
        self.sent.lock().await.push(message.clone());
    }
}
