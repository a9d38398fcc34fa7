//! Migration to create the sync_runs table.
//!
//! sync_runs is the append-mostly ledger of reconciliation attempts: one row
//! per run with its status, counts, and per-record failure maps.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncRuns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncRuns::TableName).text().not_null())
                    .col(ColumnDef::new(SyncRuns::Direction).text().not_null())
                    .col(
                        ColumnDef::new(SyncRuns::RanOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::RecordsSynced)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::RecordsRequired)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncRuns::ErrorMessage).text().null())
                    .col(ColumnDef::new(SyncRuns::FailedSourceIds).json_binary().null())
                    .col(ColumnDef::new(SyncRuns::FailedTargetIds).json_binary().null())
                    .col(
                        ColumnDef::new(SyncRuns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Watermark resolution scans by (table_name, ran_on).
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_runs_table_ran_on")
                    .table(SyncRuns::Table)
                    .col(SyncRuns::TableName)
                    .col(SyncRuns::RanOn)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_runs_status")
                    .table(SyncRuns::Table)
                    .col(SyncRuns::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_sync_runs_table_ran_on").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_runs_status").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SyncRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncRuns {
    Table,
    Id,
    TableName,
    Direction,
    RanOn,
    Status,
    RecordsSynced,
    RecordsRequired,
    ErrorMessage,
    FailedSourceIds,
    FailedTargetIds,
    CreatedAt,
    UpdatedAt,
}
