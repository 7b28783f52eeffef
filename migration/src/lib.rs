//! Database migrations for tracksync.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_05_10_100000_create_projects;
mod m2026_05_10_100100_create_sync_jobs;
mod m2026_05_10_100200_create_sync_states;
mod m2026_05_10_100300_create_sync_logs;
mod m2026_05_10_100400_create_issues;
mod m2026_05_10_100500_create_issue_comments;
mod m2026_05_10_100600_create_issue_worklogs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_05_10_100000_create_projects::Migration),
            Box::new(m2026_05_10_100100_create_sync_jobs::Migration),
            Box::new(m2026_05_10_100200_create_sync_states::Migration),
            Box::new(m2026_05_10_100300_create_sync_logs::Migration),
            Box::new(m2026_05_10_100400_create_issues::Migration),
            Box::new(m2026_05_10_100500_create_issue_comments::Migration),
            Box::new(m2026_05_10_100600_create_issue_worklogs::Migration),
        ]
    }
}
