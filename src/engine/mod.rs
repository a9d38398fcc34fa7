//! Reconciliation engine
//!
//! One parameterized engine serves every synchronized table in both
//! directions: the direction selects which store acts as source and which
//! as target, and the table selects the field-mapper pair from the
//! registry. [`SyncEngine::run`] owns the run state machine, wraps the
//! work in a scoped store session, and finalizes the ledger row.

use std::sync::Arc;

use metrics::histogram;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{EngineError, LedgerError};
use crate::models::sync_run::{Model as SyncRun, RunStatus, SyncDirection};
use crate::repositories::{FailedIds, SyncRunRepository};
use crate::store::{ConnectionLifecycle, FieldMapper, MapperRegistry, RecordStore};

pub mod executor;
pub mod planner;
pub mod watermark;

use executor::ReconciliationExecutor;
use planner::ReconciliationPlanner;
use watermark::WatermarkResolver;

/// Terminal outcome of a run, as persisted to the ledger.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub records_synced: i32,
    pub records_required: i32,
    pub failed_source_ids: FailedIds,
    pub failed_target_ids: FailedIds,
}

impl RunResult {
    fn from_run(run: &SyncRun) -> Self {
        Self {
            run_id: run.id,
            status: run.run_status().unwrap_or(RunStatus::Failed),
            records_synced: run.records_synced,
            records_required: run.records_required,
            failed_source_ids: SyncRun::decode_failed_ids(run.failed_source_ids.as_ref()),
            failed_target_ids: SyncRun::decode_failed_ids(run.failed_target_ids.as_ref()),
        }
    }
}

/// A structural failure mid-run, carrying whatever per-record failures had
/// accumulated before the abort so the ledger row preserves them.
struct RunAbort {
    error: EngineError,
    failed_source_ids: FailedIds,
    failed_target_ids: FailedIds,
}

impl RunAbort {
    fn bare(error: EngineError) -> Self {
        Self {
            error,
            failed_source_ids: FailedIds::new(),
            failed_target_ids: FailedIds::new(),
        }
    }
}

/// The reconciliation engine and run orchestrator.
pub struct SyncEngine {
    ledger: SyncRunRepository,
    primary: Arc<dyn RecordStore>,
    remote: Arc<dyn RecordStore>,
    registry: MapperRegistry,
    sessions: Arc<dyn ConnectionLifecycle>,
}

impl SyncEngine {
    pub fn new(
        ledger: SyncRunRepository,
        primary: Arc<dyn RecordStore>,
        remote: Arc<dyn RecordStore>,
        registry: MapperRegistry,
        sessions: Arc<dyn ConnectionLifecycle>,
    ) -> Self {
        Self {
            ledger,
            primary,
            remote,
            registry,
            sessions,
        }
    }

    /// Execute one reconciliation run for a (table, direction) pair.
    ///
    /// Each call is an independent run with its own ledger row. The row
    /// moves pending -> in_progress -> completed | failed; a failure before
    /// the in_progress transition leaves it pending and propagates. The
    /// store session is released on every exit path.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        table: &str,
        direction: SyncDirection,
    ) -> Result<RunResult, EngineError> {
        if self.registry.get(table).is_none() {
            return Err(EngineError::UnknownTable {
                table: table.to_string(),
            });
        }

        let started = std::time::Instant::now();
        let run = self.ledger.create(table, direction).await?;

        let lease = self
            .sessions
            .open()
            .await
            .map_err(|source| EngineError::Connection { source })?;

        let result = self.run_leased(run, table, direction).await;

        if let Err(close_err) = lease.close().await {
            tracing::warn!(error = %close_err, "failed to close store session");
        }

        let labels = vec![("table", table.to_string())];
        histogram!("accord_run_duration_seconds", &labels)
            .record(started.elapsed().as_secs_f64());

        result
    }

    async fn run_leased(
        &self,
        run: SyncRun,
        table: &str,
        direction: SyncDirection,
    ) -> Result<RunResult, EngineError> {
        // A failed start leaves the row pending; without a trackable ledger
        // row there is no run to continue.
        let run = self.ledger.start(run).await?;

        match self.reconcile(&run, table, direction).await {
            Ok(result) => Ok(result),
            Err(abort) => {
                if let Err(ledger_err) = self
                    .ledger
                    .fail(
                        run,
                        &abort.error.to_string(),
                        &abort.failed_source_ids,
                        &abort.failed_target_ids,
                    )
                    .await
                {
                    tracing::error!(
                        error = %ledger_err,
                        "failed to record run failure in ledger"
                    );
                }
                Err(abort.error)
            }
        }
    }

    async fn reconcile(
        &self,
        run: &SyncRun,
        table: &str,
        direction: SyncDirection,
    ) -> Result<RunResult, RunAbort> {
        let (source, target, mapper) = self
            .endpoints(table, direction)
            .map_err(RunAbort::bare)?;

        let watermark = WatermarkResolver::new(&self.ledger)
            .resolve(table, direction)
            .await
            .map_err(|err| RunAbort::bare(err.into()))?;

        let plan = ReconciliationPlanner::new(source, target, mapper)
            .plan(table, watermark)
            .await
            .map_err(|source| {
                RunAbort::bare(EngineError::Plan {
                    table: table.to_string(),
                    source,
                })
            })?;

        let required = clamp_count(plan.records_required());
        let already_linked = plan.already_linked();
        let report = ReconciliationExecutor::new(target, mapper)
            .apply(table, &plan)
            .await;

        // Records already present on the target satisfy their share of the
        // create demand without a write.
        let synced = report.synced() + already_linked;

        let finished = self
            .ledger
            .finish(
                run.clone(),
                clamp_count(synced),
                required,
                &report.failed_source_ids,
                &report.failed_target_ids,
            )
            .await
            .map_err(|err: LedgerError| RunAbort {
                error: err.into(),
                failed_source_ids: report.failed_source_ids.clone(),
                failed_target_ids: report.failed_target_ids.clone(),
            })?;

        Ok(RunResult::from_run(&finished))
    }

    fn endpoints(
        &self,
        table: &str,
        direction: SyncDirection,
    ) -> Result<(&dyn RecordStore, &dyn RecordStore, &dyn FieldMapper), EngineError> {
        let mapping = self
            .registry
            .get(table)
            .ok_or_else(|| EngineError::UnknownTable {
                table: table.to_string(),
            })?;

        Ok(match direction {
            SyncDirection::PrimaryToRemote => (
                self.primary.as_ref(),
                self.remote.as_ref(),
                mapping.to_remote.as_ref(),
            ),
            SyncDirection::RemoteToPrimary => (
                self.remote.as_ref(),
                self.primary.as_ref(),
                mapping.to_primary.as_ref(),
            ),
        })
    }
}

fn clamp_count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
