//! Reconciliation execution
//!
//! Applies a plan to the target store with per-record failure isolation:
//! a record that fails to create, update, or delete is recorded into the
//! run's failure maps and the batch continues. Order is fixed as
//! create, then update, then delete.

use metrics::counter;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::repositories::FailedIds;
use crate::store::{FieldMapper, RecordStore};

use super::planner::ReconciliationPlan;

/// Outcome of applying one plan.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Source record id -> error, for failed creates.
    pub failed_source_ids: FailedIds,
    /// Target record id -> error, for failed updates and deletes.
    pub failed_target_ids: FailedIds,
}

impl ExecutionReport {
    /// Records counted toward the run's synced/required accounting.
    /// Deletions are tracked but never counted here.
    pub fn synced(&self) -> usize {
        self.created + self.updated
    }
}

/// Applies planned changes to the target store.
pub struct ReconciliationExecutor<'a> {
    target: &'a dyn RecordStore,
    mapper: &'a dyn FieldMapper,
}

impl<'a> ReconciliationExecutor<'a> {
    pub fn new(target: &'a dyn RecordStore, mapper: &'a dyn FieldMapper) -> Self {
        Self { target, mapper }
    }

    pub async fn apply(&self, table: &str, plan: &ReconciliationPlan) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let labels = vec![("table", table.to_string())];

        for record in &plan.to_create {
            let fields = self.mapper.to_target(record);
            match self.target.create(table, &fields).await {
                Ok(target_id) => {
                    report.created += 1;
                    counter!("accord_records_created_total", &labels).increment(1);
                    debug!(table, source_id = %record.id, %target_id, "record created");
                }
                Err(err) => {
                    warn!(table, source_id = %record.id, error = %err, "create failed");
                    counter!("accord_record_failures_total", &labels).increment(1);
                    report.failed_source_ids.insert(record.id.clone(), err.to_string());
                }
            }
        }

        for planned in &plan.to_update {
            let fields = self.mapper.to_target(&planned.source);
            match self.target.update(table, &planned.target_id, &fields).await {
                Ok(()) => {
                    report.updated += 1;
                    counter!("accord_records_updated_total", &labels).increment(1);
                }
                Err(err) => {
                    warn!(table, target_id = %planned.target_id, error = %err, "update failed");
                    counter!("accord_record_failures_total", &labels).increment(1);
                    report
                        .failed_target_ids
                        .insert(planned.target_id.clone(), err.to_string());
                }
            }
        }

        for target_id in &plan.to_delete {
            match self.target.delete(table, target_id).await {
                Ok(()) => {
                    report.deleted += 1;
                    counter!("accord_records_deleted_total", &labels).increment(1);
                }
                // Already gone: the desired end state, not a failure.
                Err(StoreError::NotFound { .. }) => {
                    report.deleted += 1;
                    debug!(table, %target_id, "record already absent, delete skipped");
                }
                Err(err) => {
                    warn!(table, %target_id, error = %err, "delete failed");
                    counter!("accord_record_failures_total", &labels).increment(1);
                    report
                        .failed_target_ids
                        .insert(target_id.clone(), err.to_string());
                }
            }
        }

        report
    }
}
