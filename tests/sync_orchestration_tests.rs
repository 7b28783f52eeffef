//! End-to-end orchestration tests: a real local engine, an in-memory
//! database with migrations applied, and a wiremock tracker API.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use migration::{Migrator, MigratorTrait};
use tracksync::config::AppConfig;
use tracksync::engine::WorkflowEngine;
use tracksync::models::{issue, issue_comment, project, sync_job, sync_log, sync_state};
use tracksync::runtime::{self, Orchestrator};
use tracksync::sync::schedule_manager::{ManualSyncOptions, schedule_id_for};

async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("create in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

async fn seed_project(db: &DatabaseConnection, base_url: &str, account_ids: &[&str]) -> Uuid {
    let now = Utc::now().fixed_offset();
    let id = Uuid::new_v4();

    project::ActiveModel {
        id: Set(id),
        name: Set("Acme Rollout".to_string()),
        tracker_base_url: Set(base_url.to_string()),
        tracker_email: Set("bot@acme.example".to_string()),
        tracker_api_token: Set("token".to_string()),
        tracked_account_ids: Set(json!(account_ids)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert project");

    id
}

fn orchestrator(db: DatabaseConnection) -> Orchestrator {
    let mut config = AppConfig::default();
    config.engine.tick_interval_seconds = 1;
    config.engine.activity_timeout_seconds = 10;
    config.engine.activity_max_attempts = 1;
    config.engine.retry_base_seconds = 0;
    config.engine.retry_max_seconds = 1;
    config.engine.retry_jitter_factor = 0.0;
    runtime::build(&config, db)
}

fn issue_payload(id: &str, key: &str, updated: &str) -> serde_json::Value {
    json!({
        "id": id,
        "key": key,
        "fields": {
            "summary": format!("Summary for {key}"),
            "status": {"name": "In Progress"},
            "assignee": {"accountId": "acc-1"},
            "updated": updated,
            "comment": {
                "comments": [
                    {
                        "id": format!("{id}-c1"),
                        "author": {"accountId": "acc-1"},
                        "body": {"type": "doc"},
                        "updated": updated,
                    },
                    {
                        "id": format!("{id}-c2"),
                        "author": {"accountId": "acc-other"},
                        "body": {"type": "doc"},
                        "updated": updated,
                    }
                ]
            },
            "worklog": {
                "worklogs": [
                    {
                        "id": format!("{id}-w1"),
                        "author": {"accountId": "acc-1"},
                        "timeSpentSeconds": 1800,
                        "started": updated,
                        "updated": updated,
                    }
                ]
            }
        }
    })
}

/// Two pages: the first hands out a continuation token, the second is last.
async fn mount_two_page_search(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .and(body_partial_json(json!({"nextPageToken": "tok-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [issue_payload("1002", "ACME-2", "2026-05-02T09:00:00.000+0000")],
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [issue_payload("1001", "ACME-1", "2026-05-01T10:30:00.000+0000")],
            "nextPageToken": "tok-2",
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn manual_sync_paginates_and_persists() {
    let server = MockServer::start().await;
    mount_two_page_search(&server).await;

    let db = test_db().await;
    let project_id = seed_project(&db, &server.uri(), &["acc-1"]).await;
    let orchestrator = orchestrator(db.clone());

    orchestrator
        .schedule_manager
        .trigger_manual(project_id, ManualSyncOptions::default())
        .await
        .unwrap();
    orchestrator.engine.wait_until_idle().await;

    let issues = issue::Entity::find()
        .filter(issue::Column::ProjectId.eq(project_id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().any(|row| row.issue_key == "ACME-1"));
    assert!(issues.iter().any(|row| row.issue_key == "ACME-2"));

    // Only comments authored by tracked accounts were persisted.
    let comments = issue_comment::Entity::find()
        .filter(issue_comment::Column::ProjectId.eq(project_id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(comments.len(), 2);
    assert!(
        comments
            .iter()
            .all(|row| row.author_account_id.as_deref() == Some("acc-1"))
    );

    // Sync state advanced to the newest remote update seen.
    let states = sync_state::Entity::find()
        .filter(sync_state::Column::ProjectId.eq(project_id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(states.len(), 3);
    for state in &states {
        assert_eq!(state.status, "ok");
        assert!(state.last_synced_at.is_some());
    }

    let logs = sync_log::Entity::find()
        .filter(sync_log::Column::ProjectId.eq(project_id))
        .all(&db)
        .await
        .unwrap();
    assert!(
        logs.iter()
            .any(|entry| entry.message == "Manual sync triggered")
    );
    assert!(
        logs.iter()
            .any(|entry| entry.message.starts_with("Sync completed"))
    );

    let job = sync_job::Entity::find()
        .filter(sync_job::Column::ProjectId.eq(project_id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "active");
    assert!(job.last_run_at.is_some());
}

#[tokio::test]
async fn rerunning_the_same_pages_is_idempotent() {
    let server = MockServer::start().await;
    mount_two_page_search(&server).await;

    let db = test_db().await;
    let project_id = seed_project(&db, &server.uri(), &["acc-1"]).await;
    let orchestrator = orchestrator(db.clone());

    for _ in 0..2 {
        orchestrator
            .schedule_manager
            .trigger_manual(
                project_id,
                ManualSyncOptions {
                    full_resync: true,
                    account_ids: None,
                },
            )
            .await
            .unwrap();
        orchestrator.engine.wait_until_idle().await;
    }

    let issues = issue::Entity::find()
        .filter(issue::Column::ProjectId.eq(project_id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(issues, 2);

    let comments = issue_comment::Entity::find()
        .filter(issue_comment::Column::ProjectId.eq(project_id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(comments, 2);
}

#[tokio::test]
async fn suspended_subscription_marks_job_error_and_backs_off() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"errorCode": "SUSPENDED_PAYMENT"})),
        )
        .mount(&server)
        .await;

    let db = test_db().await;
    let project_id = seed_project(&db, &server.uri(), &["acc-1"]).await;
    let orchestrator = orchestrator(db.clone());

    orchestrator
        .schedule_manager
        .trigger_manual(project_id, ManualSyncOptions::default())
        .await
        .unwrap();
    orchestrator.engine.wait_until_idle().await;

    let job = sync_job::Entity::find()
        .filter(sync_job::Column::ProjectId.eq(project_id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "error");
    assert_eq!(job.backoff_level, 1);
    assert_eq!(job.cron, "*/30 * * * *");
    assert_eq!(job.backoff_original_cron.as_deref(), Some("*/15 * * * *"));

    let error_logs = sync_log::Entity::find()
        .filter(sync_log::Column::ProjectId.eq(project_id))
        .filter(sync_log::Column::Level.eq("error"))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(error_logs.len(), 1);
    let detail = error_logs[0].detail.as_ref().unwrap();
    assert_eq!(detail["classification"]["code"], json!("SUSPENDED_PAYMENT"));
}

#[tokio::test]
async fn recovery_after_failures_restores_cadence() {
    let server = MockServer::start().await;

    let db = test_db().await;
    let project_id = seed_project(&db, &server.uri(), &["acc-1"]).await;
    let orchestrator = orchestrator(db.clone());

    // First run fails terminally.
    let failing = Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({})))
        .up_to_n_times(1)
        .mount_as_scoped(&server)
        .await;

    orchestrator
        .schedule_manager
        .trigger_manual(project_id, ManualSyncOptions::default())
        .await
        .unwrap();
    orchestrator.engine.wait_until_idle().await;
    drop(failing);

    let job = sync_job::Entity::find()
        .filter(sync_job::Column::ProjectId.eq(project_id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "error");
    assert_eq!(job.cron, "*/30 * * * *");

    // Next run succeeds and restores the original cadence.
    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": []})))
        .mount(&server)
        .await;

    orchestrator
        .schedule_manager
        .trigger_manual(project_id, ManualSyncOptions::default())
        .await
        .unwrap();
    orchestrator.engine.wait_until_idle().await;

    let job = sync_job::Entity::find()
        .filter(sync_job::Column::ProjectId.eq(project_id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "active");
    assert_eq!(job.backoff_level, 0);
    assert_eq!(job.cron, "*/15 * * * *");
    assert!(job.backoff_original_cron.is_none());
}

#[tokio::test]
async fn boot_reregisters_schedules_for_non_paused_jobs() {
    let db = test_db().await;
    let server = MockServer::start().await;

    let active_project = seed_project(&db, &server.uri(), &["acc-1"]).await;
    let paused_project = seed_project(&db, &server.uri(), &["acc-1"]).await;

    {
        let orchestrator = orchestrator(db.clone());
        orchestrator
            .schedule_manager
            .initialize(active_project)
            .await
            .unwrap();
        orchestrator
            .schedule_manager
            .initialize(paused_project)
            .await
            .unwrap();
        orchestrator
            .schedule_manager
            .pause(paused_project)
            .await
            .unwrap();
    }

    // A fresh engine lost the in-memory schedule map; the job table is the
    // durable source it is rebuilt from.
    let restarted = orchestrator(db.clone());
    let restored = runtime::reregister_schedules(&restarted).await.unwrap();
    assert_eq!(restored, 1);

    assert!(
        restarted
            .engine
            .describe_schedule(&schedule_id_for(active_project))
            .await
            .is_ok()
    );
    assert!(
        restarted
            .engine
            .describe_schedule(&schedule_id_for(paused_project))
            .await
            .is_err()
    );
}
