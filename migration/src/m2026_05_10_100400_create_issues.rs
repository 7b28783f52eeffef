//! Migration to create the issues table.
//!
//! Synced tracker issues, upserted by (project_id, remote_id) so re-delivered
//! pages are idempotent.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Issues::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Issues::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Issues::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Issues::RemoteId).text().not_null())
                    .col(ColumnDef::new(Issues::IssueKey).text().not_null())
                    .col(ColumnDef::new(Issues::Summary).text().null())
                    .col(ColumnDef::new(Issues::Status).text().null())
                    .col(ColumnDef::new(Issues::AssigneeAccountId).text().null())
                    .col(
                        ColumnDef::new(Issues::RemoteUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Issues::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(Issues::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Issues::UpdatedAt)
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
                    .name("idx_issues_project_remote_unique")
                    .table(Issues::Table)
                    .col(Issues::ProjectId)
                    .col(Issues::RemoteId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Issues::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Issues {
    Table,
    Id,
    ProjectId,
    RemoteId,
    IssueKey,
    Summary,
    Status,
    AssigneeAccountId,
    RemoteUpdatedAt,
    Payload,
    CreatedAt,
    UpdatedAt,
}
