//! Backoff / telemetry controller.
//!
//! Observes terminal sync outcomes. Failures walk the cron cadence down an
//! ordered ladder (original cron first, then increasingly sparse steps);
//! the next clean run restores the original cadence in a single step. An
//! alert fires only when the backoff level strictly increases, so a plateau
//! of repeated failures stays quiet after the first notification.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::jira::JiraErrorClassification;
use crate::models::sync_job::{STATUS_ACTIVE, STATUS_ERROR};
use crate::models::sync_log::{LEVEL_ERROR, LEVEL_INFO};
use crate::notify::{ChannelKind, NotificationMessage, NotificationSender};
use crate::repositories::project::ProjectRepository;
use crate::repositories::sync_job::SyncJobRepository;
use crate::repositories::sync_log::SyncLogRepository;
use crate::sync::schedule_manager::ScheduleManager;

/// Fixed escalation steps appended after the job's original cron.
pub const DEFAULT_CRON_LADDER: [&str; 5] = [
    "*/30 * * * *",
    "0 * * * *",
    "0 */3 * * *",
    "0 */6 * * *",
    "0 */12 * * *",
];

/// Backoff policy and alert routing.
#[derive(Debug, Clone)]
pub struct BackoffSettings {
    /// Escalation steps appended after the original cron.
    pub ladder: Vec<String>,
    pub alert_channel: ChannelKind,
    pub alert_recipients: Vec<String>,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            ladder: DEFAULT_CRON_LADDER
                .iter()
                .map(|cron| cron.to_string())
                .collect(),
            alert_channel: ChannelKind::Email,
            alert_recipients: Vec::new(),
        }
    }
}

/// A terminal sync failure to record.
#[derive(Debug)]
pub struct FailureReport<'a> {
    pub project_id: Uuid,
    pub classification: &'a JiraErrorClassification,
    pub message: &'a str,
    pub detail: Option<JsonValue>,
}

pub struct BackoffController {
    jobs: SyncJobRepository,
    logs: SyncLogRepository,
    projects: ProjectRepository,
    schedule_manager: Arc<ScheduleManager>,
    notifier: Arc<dyn NotificationSender>,
    settings: BackoffSettings,
}

impl BackoffController {
    pub fn new(
        db: DatabaseConnection,
        schedule_manager: Arc<ScheduleManager>,
        notifier: Arc<dyn NotificationSender>,
        settings: BackoffSettings,
    ) -> Self {
        Self {
            jobs: SyncJobRepository::new(db.clone()),
            logs: SyncLogRepository::new(db.clone()),
            projects: ProjectRepository::new(db),
            schedule_manager,
            notifier,
            settings,
        }
    }

    /// Record a terminal failure: advance the backoff level by at most one,
    /// reschedule if the cadence changed, persist the state, and alert on a
    /// strict level increase.
    pub async fn record_failure(&self, report: FailureReport<'_>) -> Result<()> {
        let Some(job) = self.jobs.find_by_project(report.project_id).await? else {
            // No retroactive job creation for failures of unknown projects.
            error!(
                project_id = %report.project_id,
                message = %report.message,
                "Sync failure reported for a project without a sync job; ignoring"
            );
            return Ok(());
        };

        let original_cron = job
            .backoff_original_cron
            .clone()
            .unwrap_or_else(|| job.cron.clone());
        let ladder = build_ladder(&original_cron, &self.settings.ladder);
        let max_level = (ladder.len() - 1) as i32;
        let previous_level = job.backoff_level.clamp(0, max_level);
        let next_level = (previous_level + 1).min(max_level);
        let next_cron = ladder[next_level as usize].clone();
        let escalated = next_level > previous_level;

        if next_cron != job.cron {
            self.schedule_manager
                .reschedule(report.project_id, &next_cron)
                .await?;
        }

        let notified_at = if escalated { Some(Utc::now()) } else { None };
        self.jobs
            .apply_backoff(
                report.project_id,
                next_level,
                &original_cron,
                STATUS_ERROR,
                notified_at,
            )
            .await?;

        let mut log_detail = json!({
            "classification": report.classification,
            "retryable": report.classification.retryable,
            "cron": next_cron,
            "backoff_level": next_level,
        });
        if let Some(extra) = report.detail {
            log_detail["detail"] = extra;
        }

        self.logs
            .append(
                report.project_id,
                LEVEL_ERROR,
                &format!("Sync failed: {}", report.message),
                Some(log_detail),
            )
            .await?;

        warn!(
            project_id = %report.project_id,
            code = %report.classification.code,
            retryable = report.classification.retryable,
            backoff_level = next_level,
            cron = %next_cron,
            "Recorded sync failure"
        );

        if escalated {
            counter!("backoff_escalations_total").increment(1);
            self.send_escalation_alert(
                report.project_id,
                report.classification,
                report.message,
                next_level,
                &next_cron,
            )
            .await;
        }

        Ok(())
    }

    /// Restore the original cadence after a clean run. A no-op for unknown
    /// jobs and for jobs already at level zero.
    pub async fn record_success(&self, project_id: Uuid) -> Result<()> {
        let Some(job) = self.jobs.find_by_project(project_id).await? else {
            return Ok(());
        };
        if job.backoff_level == 0 {
            return Ok(());
        }

        let original_cron = job
            .backoff_original_cron
            .clone()
            .unwrap_or_else(|| job.cron.clone());

        if original_cron != job.cron {
            self.schedule_manager
                .reschedule(project_id, &original_cron)
                .await?;
        }

        self.jobs.clear_backoff(project_id, STATUS_ACTIVE).await?;

        self.logs
            .append(
                project_id,
                LEVEL_INFO,
                "Sync cadence restored after clean run",
                Some(json!({"cron": original_cron})),
            )
            .await?;

        info!(
            project_id = %project_id,
            cron = %original_cron,
            "Restored sync cadence"
        );
        Ok(())
    }

    async fn send_escalation_alert(
        &self,
        project_id: Uuid,
        classification: &JiraErrorClassification,
        message: &str,
        level: i32,
        cron: &str,
    ) {
        if self.settings.alert_recipients.is_empty()
            && self.settings.alert_channel == ChannelKind::Email
        {
            debug!(project_id = %project_id, "No alert recipients configured; skipping alert");
            return;
        }

        let project_name = self
            .projects
            .find_by_id(project_id)
            .await
            .ok()
            .flatten()
            .map(|project| project.name)
            .unwrap_or_else(|| project_id.to_string());

        let subject = format!("Sync cadence backed off for {project_name}");
        let text = format!(
            "Synchronization for {project_name} keeps failing ({}: {message}).\n\
             The sync schedule has been slowed to '{cron}' (backoff level {level}).\n\
             The original cadence is restored automatically after the next clean run.",
            classification.code,
        );

        self.notifier
            .send(&NotificationMessage {
                channel: self.settings.alert_channel,
                to: self.settings.alert_recipients.clone(),
                subject,
                text,
                html: None,
            })
            .await;
    }
}

/// Ordered, deduplicated cron ladder seeded by the original cadence.
///
/// Insertion order defines the level indexing, so a fixed step equal to the
/// original cron collapses into level zero instead of repeating.
fn build_ladder(original_cron: &str, steps: &[String]) -> Vec<String> {
    let mut ladder: Vec<String> = Vec::with_capacity(steps.len() + 1);
    for cron in std::iter::once(original_cron).chain(steps.iter().map(String::as_str)) {
        if !ladder.iter().any(|existing| existing == cron) {
            ladder.push(cron.to_string());
        }
    }
    ladder
}
