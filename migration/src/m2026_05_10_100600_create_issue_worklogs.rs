//! Migration to create the issue_worklogs table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IssueWorklogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IssueWorklogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IssueWorklogs::ProjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(IssueWorklogs::IssueRemoteId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IssueWorklogs::RemoteId).text().not_null())
                    .col(
                        ColumnDef::new(IssueWorklogs::AuthorAccountId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IssueWorklogs::TimeSpentSeconds)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IssueWorklogs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IssueWorklogs::RemoteUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IssueWorklogs::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IssueWorklogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(IssueWorklogs::UpdatedAt)
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
                    .name("idx_issue_worklogs_project_remote_unique")
                    .table(IssueWorklogs::Table)
                    .col(IssueWorklogs::ProjectId)
                    .col(IssueWorklogs::RemoteId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IssueWorklogs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum IssueWorklogs {
    Table,
    Id,
    ProjectId,
    IssueRemoteId,
    RemoteId,
    AuthorAccountId,
    TimeSpentSeconds,
    StartedAt,
    RemoteUpdatedAt,
    Payload,
    CreatedAt,
    UpdatedAt,
}
