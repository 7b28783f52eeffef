//! Migration to create the sync_jobs table.
//!
//! One row per project, holding the workflow/schedule identifiers registered
//! with the workflow engine, the current cron cadence, and backoff state.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncJobs::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(SyncJobs::WorkflowId).text().not_null())
                    .col(ColumnDef::new(SyncJobs::ScheduleId).text().not_null())
                    .col(ColumnDef::new(SyncJobs::Cron).text().not_null())
                    .col(
                        ColumnDef::new(SyncJobs::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::LastRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::NextRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::BackoffLevel)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncJobs::BackoffOriginalCron).text().null())
                    .col(
                        ColumnDef::new(SyncJobs::BackoffNotifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_project_unique")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::ProjectId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncJobs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SyncJobs {
    Table,
    Id,
    ProjectId,
    WorkflowId,
    ScheduleId,
    Cron,
    Status,
    LastRunAt,
    NextRunAt,
    BackoffLevel,
    BackoffOriginalCron,
    BackoffNotifiedAt,
    CreatedAt,
    UpdatedAt,
}
