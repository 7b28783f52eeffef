//! Migration to create the projects table.
//!
//! Projects are the aggregate root for sync orchestration: each row carries
//! the tracker endpoint, credentials, and the set of tracked remote accounts.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Projects::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Projects::Name).text().not_null())
                    .col(ColumnDef::new(Projects::TrackerBaseUrl).text().not_null())
                    .col(ColumnDef::new(Projects::TrackerEmail).text().not_null())
                    .col(ColumnDef::new(Projects::TrackerApiToken).text().not_null())
                    .col(
                        ColumnDef::new(Projects::TrackedAccountIds)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Projects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Projects::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Projects {
    Table,
    Id,
    Name,
    TrackerBaseUrl,
    TrackerEmail,
    TrackerApiToken,
    TrackedAccountIds,
    CreatedAt,
    UpdatedAt,
}
