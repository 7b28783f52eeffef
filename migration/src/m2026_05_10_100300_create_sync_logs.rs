//! Migration to create the sync_logs table.
//!
//! Append-only audit trail of sync lifecycle events per project.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncLogs::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(SyncLogs::Level).text().not_null())
                    .col(ColumnDef::new(SyncLogs::Message).text().not_null())
                    .col(ColumnDef::new(SyncLogs::Detail).json_binary().null())
                    .col(
                        ColumnDef::new(SyncLogs::CreatedAt)
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
                    .name("idx_sync_logs_project_created")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::ProjectId)
                    .col(SyncLogs::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncLogs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SyncLogs {
    Table,
    Id,
    ProjectId,
    Level,
    Message,
    Detail,
    CreatedAt,
}
