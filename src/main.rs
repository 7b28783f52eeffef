//! tracksync entry point.

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use tracing::info;
use uuid::Uuid;

use tracksync::config::ConfigLoader;
use tracksync::sync::schedule_manager::ManualSyncOptions;
use tracksync::{db, logging, runtime};

#[derive(Parser)]
#[command(name = "tracksync", about = "Tracker sync orchestration service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync daemon.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Trigger a one-off sync for a project and wait for it to finish.
    Trigger {
        project_id: Uuid,
        /// Ignore stored sync state and re-fetch everything.
        #[arg(long)]
        full: bool,
        /// Restrict the run to these remote account ids.
        #[arg(long = "account-id")]
        account_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new().load()?;
    logging::init_subscriber(&config);

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime::run(config).await,
        Command::Migrate => {
            let db = db::init_pool(&config).await?;
            Migrator::up(&db, None).await?;
            info!("Migrations applied");
            Ok(())
        }
        Command::Trigger {
            project_id,
            full,
            account_ids,
        } => {
            let db = db::init_pool(&config).await?;
            Migrator::up(&db, None).await?;

            let orchestrator = runtime::build(&config, db);
            let workflow_id = orchestrator
                .schedule_manager
                .trigger_manual(
                    project_id,
                    ManualSyncOptions {
                        full_resync: full,
                        account_ids: (!account_ids.is_empty()).then_some(account_ids),
                    },
                )
                .await?;

            info!(workflow_id = %workflow_id, "Triggered manual sync; waiting for completion");
            orchestrator.engine.wait_until_idle().await;
            Ok(())
        }
    }
}
