//! # SyncRun Repository
//!
//! Repository operations for the sync_runs ledger, encapsulating SeaORM
//! access and enforcing the run status state machine: a row moves
//! pending -> in_progress -> completed | failed and never backwards.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::sync_run::{ActiveModel, Column, Entity, Model, RunStatus, SyncDirection};

/// Per-record failure map: stable record identifier -> error message.
pub type FailedIds = BTreeMap<String, String>;

fn encode_failed_ids(map: &FailedIds) -> Option<JsonValue> {
    if map.is_empty() {
        return None;
    }
    Some(JsonValue::Object(
        map.iter()
            .map(|(id, message)| (id.clone(), JsonValue::String(message.clone())))
            .collect(),
    ))
}

/// Repository for ledger rows in the sync_runs table
pub struct SyncRunRepository {
    db: DatabaseConnection,
}

impl SyncRunRepository {
    /// Create a new SyncRunRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new pending run for the given table and direction.
    ///
    /// `ran_on` is stamped at creation time; it becomes the watermark for
    /// the next incremental run once this run completes.
    pub async fn create(
        &self,
        table: &str,
        direction: SyncDirection,
    ) -> Result<Model, LedgerError> {
        let table = table.trim();
        if table.is_empty() {
            return Err(LedgerError::validation("table name cannot be empty"));
        }

        let now = Utc::now().fixed_offset();
        let run = ActiveModel {
            id: Set(Uuid::new_v4()),
            table_name: Set(table.to_string()),
            direction: Set(direction.as_str().to_string()),
            ran_on: Set(now),
            status: Set(RunStatus::Pending.as_str().to_string()),
            records_synced: Set(0),
            records_required: Set(0),
            error_message: Set(None),
            failed_source_ids: Set(None),
            failed_target_ids: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = run.insert(&self.db).await?;

        tracing::info!(
            run_id = %inserted.id,
            table = %inserted.table_name,
            direction = %inserted.direction,
            "sync run created"
        );

        Ok(inserted)
    }

    /// Move a pending run to in_progress.
    pub async fn start(&self, run: Model) -> Result<Model, LedgerError> {
        self.transition(&run, RunStatus::InProgress)?;

        let mut active: ActiveModel = run.into();
        active.status = Set(RunStatus::InProgress.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    /// Finalize an in_progress run from execution counts.
    ///
    /// The run completes only when every required create/update succeeded;
    /// any shortfall marks it failed even though some records were applied.
    pub async fn finish(
        &self,
        run: Model,
        records_synced: i32,
        records_required: i32,
        failed_source_ids: &FailedIds,
        failed_target_ids: &FailedIds,
    ) -> Result<Model, LedgerError> {
        let status = if records_synced == records_required {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.transition(&run, status)?;

        let run_id = run.id;
        let mut active: ActiveModel = run.into();
        active.status = Set(status.as_str().to_string());
        active.records_synced = Set(records_synced);
        active.records_required = Set(records_required);
        active.failed_source_ids = Set(encode_failed_ids(failed_source_ids));
        active.failed_target_ids = Set(encode_failed_ids(failed_target_ids));
        active.updated_at = Set(Utc::now().fixed_offset());

        let updated = active.update(&self.db).await?;

        tracing::info!(
            run_id = %run_id,
            status = %status,
            records_synced,
            records_required,
            "sync run finished"
        );

        Ok(updated)
    }

    /// Mark an in_progress run failed with a run-level error message.
    ///
    /// Used for structural failures, not per-record ones; the failure maps
    /// carry whatever per-record errors had accumulated before the abort.
    pub async fn fail(
        &self,
        run: Model,
        error_message: &str,
        failed_source_ids: &FailedIds,
        failed_target_ids: &FailedIds,
    ) -> Result<Model, LedgerError> {
        self.transition(&run, RunStatus::Failed)?;

        let run_id = run.id;
        let mut active: ActiveModel = run.into();
        active.status = Set(RunStatus::Failed.as_str().to_string());
        active.error_message = Set(Some(error_message.to_string()));
        active.failed_source_ids = Set(encode_failed_ids(failed_source_ids));
        active.failed_target_ids = Set(encode_failed_ids(failed_target_ids));
        active.updated_at = Set(Utc::now().fixed_offset());

        let updated = active.update(&self.db).await?;

        tracing::warn!(run_id = %run_id, error = %error_message, "sync run failed");

        Ok(updated)
    }

    /// Most recent completed run for a (table, direction) pair, by ran_on
    /// descending. In-progress and failed runs are skipped so their windows
    /// are retried in full on the next attempt.
    pub async fn last_successful_run(
        &self,
        table: &str,
        direction: SyncDirection,
    ) -> Result<Option<Model>, LedgerError> {
        let run = Entity::find()
            .filter(Column::TableName.eq(table))
            .filter(Column::Direction.eq(direction.as_str()))
            .filter(Column::Status.eq(RunStatus::Completed.as_str()))
            .order_by_desc(Column::RanOn)
            .one(&self.db)
            .await?;

        Ok(run)
    }

    /// Recent runs for a (table, direction) pair, newest first.
    pub async fn recent_for(
        &self,
        table: &str,
        direction: SyncDirection,
        limit: u64,
    ) -> Result<Vec<Model>, LedgerError> {
        let runs = Entity::find()
            .filter(Column::TableName.eq(table))
            .filter(Column::Direction.eq(direction.as_str()))
            .order_by_desc(Column::RanOn)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(runs)
    }

    /// Reload a run row by id.
    pub async fn find(&self, run_id: Uuid) -> Result<Option<Model>, LedgerError> {
        Ok(Entity::find_by_id(run_id).one(&self.db).await?)
    }

    fn transition(&self, run: &Model, to: RunStatus) -> Result<(), LedgerError> {
        let from = run
            .run_status()
            .map_err(LedgerError::validation)?;
        let allowed = matches!(
            (from, to),
            (RunStatus::Pending, RunStatus::InProgress)
                | (RunStatus::InProgress, RunStatus::Completed)
                | (RunStatus::InProgress, RunStatus::Failed)
        );
        if !allowed {
            return Err(LedgerError::InvalidTransition {
                id: run.id,
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(())
    }
}
