//! Process wiring.
//!
//! Builds the engine, schedule manager, backoff controller, and workflow
//! runner with a single initialization point, re-registers schedules for
//! persisted jobs, and runs the engine loop until shutdown.

use std::sync::Arc;
use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{AppConfig, EngineConfig};
use crate::db;
use crate::engine::local::LocalEngine;
use crate::engine::ActivityOptions;
use crate::notify::{ChannelKind, NotificationSender, Notifier, NotifierSettings};
use crate::repositories::sync_job::SyncJobRepository;
use crate::sync::activities::Activities;
use crate::sync::backoff::{BackoffController, BackoffSettings};
use crate::sync::schedule_manager::ScheduleManager;
use crate::sync::workflow::SyncWorkflowRunner;

/// The wired-up orchestration components.
pub struct Orchestrator {
    pub db: DatabaseConnection,
    pub engine: Arc<LocalEngine>,
    pub schedule_manager: Arc<ScheduleManager>,
}

pub fn activity_options(engine: &EngineConfig) -> ActivityOptions {
    ActivityOptions {
        start_to_close: Duration::from_secs(engine.activity_timeout_seconds),
        max_attempts: engine.activity_max_attempts,
        retry_base: Duration::from_secs(engine.retry_base_seconds),
        retry_max: Duration::from_secs(engine.retry_max_seconds),
        retry_jitter_factor: engine.retry_jitter_factor,
    }
}

/// Construct the full orchestration stack against the given pool.
pub fn build(config: &AppConfig, db: DatabaseConnection) -> Orchestrator {
    let engine = Arc::new(LocalEngine::new(Duration::from_secs(
        config.engine.tick_interval_seconds,
    )));

    let schedule_manager = Arc::new(ScheduleManager::new(
        db.clone(),
        engine.clone(),
        config.sync.default_cron.clone(),
    ));

    let notifier: Arc<dyn NotificationSender> = Arc::new(Notifier::new(NotifierSettings {
        email_endpoint: config.notify.email_endpoint.clone(),
        email_from: config.notify.email_from.clone(),
        chat_webhook_url: config.notify.chat_webhook_url.clone(),
    }));

    let backoff_settings = BackoffSettings {
        ladder: config.backoff.ladder.clone(),
        // Config validation already rejected unknown channels.
        alert_channel: ChannelKind::parse(&config.backoff.alert_channel)
            .unwrap_or(ChannelKind::Email),
        alert_recipients: config.backoff.alert_recipients.clone(),
    };
    let backoff = Arc::new(BackoffController::new(
        db.clone(),
        schedule_manager.clone(),
        notifier,
        backoff_settings,
    ));

    let activities = Arc::new(Activities::new(
        db.clone(),
        backoff,
        config.sync.page_size,
    ));
    let runner = Arc::new(SyncWorkflowRunner::new(
        activities,
        activity_options(&config.engine),
    ));
    engine.register_runner(runner);

    Orchestrator {
        db,
        engine,
        schedule_manager,
    }
}

/// Re-register engine schedules for every non-paused job row.
///
/// The process-local engine loses its schedule map on restart; the job
/// table is the durable source the map is rebuilt from.
pub async fn reregister_schedules(orchestrator: &Orchestrator) -> crate::error::Result<usize> {
    let jobs = SyncJobRepository::new(orchestrator.db.clone())
        .list_non_paused()
        .await?;

    let mut restored = 0;
    for job in jobs {
        match orchestrator
            .schedule_manager
            .initialize(job.project_id)
            .await
        {
            Ok(_) => restored += 1,
            Err(err) => {
                error!(
                    project_id = %job.project_id,
                    error = %err,
                    "Failed to re-register sync schedule"
                );
            }
        }
    }

    info!(restored, "Re-registered sync schedules");
    Ok(restored)
}

/// Run the sync daemon until a shutdown signal arrives.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;
    db::health_check(&db).await?;

    let orchestrator = build(&config, db);
    reregister_schedules(&orchestrator).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    orchestrator.engine.clone().run(shutdown).await;

    Ok(())
}
