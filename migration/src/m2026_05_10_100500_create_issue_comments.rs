//! Migration to create the issue_comments table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IssueComments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IssueComments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IssueComments::ProjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(IssueComments::IssueRemoteId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IssueComments::RemoteId).text().not_null())
                    .col(
                        ColumnDef::new(IssueComments::AuthorAccountId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IssueComments::RemoteUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IssueComments::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IssueComments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(IssueComments::UpdatedAt)
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
                    .name("idx_issue_comments_project_remote_unique")
                    .table(IssueComments::Table)
                    .col(IssueComments::ProjectId)
                    .col(IssueComments::RemoteId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IssueComments::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum IssueComments {
    Table,
    Id,
    ProjectId,
    IssueRemoteId,
    RemoteId,
    AuthorAccountId,
    RemoteUpdatedAt,
    Payload,
    CreatedAt,
    UpdatedAt,
}
