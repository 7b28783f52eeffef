//! Migration to create the sync_states table.
//!
//! One row per (project, entity) pair tracking the last successful sync time
//! for issues, comments, and worklogs.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncStates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncStates::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(SyncStates::Entity).text().not_null())
                    .col(
                        ColumnDef::new(SyncStates::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncStates::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SyncStates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncStates::UpdatedAt)
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
                    .name("idx_sync_states_project_entity_unique")
                    .table(SyncStates::Table)
                    .col(SyncStates::ProjectId)
                    .col(SyncStates::Entity)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncStates::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SyncStates {
    Table,
    Id,
    ProjectId,
    Entity,
    LastSyncedAt,
    Status,
    CreatedAt,
    UpdatedAt,
}
