//! SyncRun entity model
//!
//! This module contains the SeaORM entity model for the sync_runs table,
//! which records one row per reconciliation attempt together with the
//! status state machine and per-record failure maps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Status of a reconciliation run.
///
/// Transitions are one-directional: `Pending` -> `InProgress` -> `Completed`
/// or `Failed`. A run never re-enters an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RunStatus::Pending),
            "in_progress" => Ok(RunStatus::InProgress),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Which store acts as source and which as target for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// The primary (relational) store is the source; the remote store is the target.
    PrimaryToRemote,
    /// The remote store is the source; the primary store is the target.
    RemoteToPrimary,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::PrimaryToRemote => "primary_to_remote",
            SyncDirection::RemoteToPrimary => "remote_to_primary",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "primary_to_remote" | "primary-to-remote" => Ok(SyncDirection::PrimaryToRemote),
            "remote_to_primary" | "remote-to-primary" => Ok(SyncDirection::RemoteToPrimary),
            other => Err(format!("unknown sync direction '{other}'")),
        }
    }
}

/// SyncRun entity representing one reconciliation attempt
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    /// Unique identifier for the run (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Name of the synchronized table/entity
    pub table_name: String,

    /// Sync direction (primary_to_remote or remote_to_primary)
    pub direction: String,

    /// When the run was created; the watermark for the next incremental run
    pub ran_on: DateTimeWithTimeZone,

    /// Current status (pending, in_progress, completed, failed)
    pub status: String,

    /// Count of records successfully created or updated
    pub records_synced: i32,

    /// Create+update candidates identified at plan time
    pub records_required: i32,

    /// Error text for run-level failures
    pub error_message: Option<String>,

    /// Source-side record id -> error message, for failed creates
    #[sea_orm(column_type = "JsonBinary")]
    pub failed_source_ids: Option<JsonValue>,

    /// Target-side record id -> error message, for failed updates/deletes
    #[sea_orm(column_type = "JsonBinary")]
    pub failed_target_ids: Option<JsonValue>,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed run status. Rows only ever hold values written through
    /// [`RunStatus::as_str`], so an unparseable value is reported as such.
    pub fn run_status(&self) -> Result<RunStatus, String> {
        self.status.parse()
    }

    /// Parsed sync direction.
    pub fn sync_direction(&self) -> Result<SyncDirection, String> {
        self.direction.parse()
    }

    /// Share of required records that were synced, as a percentage.
    pub fn completion_percentage(&self) -> f64 {
        if self.records_required <= 0 {
            return 0.0;
        }
        (f64::from(self.records_synced) / f64::from(self.records_required) * 100.0 * 100.0).round()
            / 100.0
    }

    /// Whether the run completed with every required record synced.
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed.as_str()
            && self.records_synced == self.records_required
    }

    /// Decode a failed-id JSON column into an ordered map.
    pub fn decode_failed_ids(column: Option<&JsonValue>) -> BTreeMap<String, String> {
        column
            .and_then(|value| value.as_object())
            .map(|object| {
                object
                    .iter()
                    .map(|(key, value)| {
                        let message = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                        (key.clone(), message)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
