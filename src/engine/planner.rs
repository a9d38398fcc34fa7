//! Reconciliation planning
//!
//! Computes the create/update/delete sets for one run from the source's
//! modified-since window and a snapshot of the target. Deletions use a
//! two-phase check: only records whose absence is confirmed by re-querying
//! the source directly become candidates, so records that are merely
//! outside the modified window are never deleted.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::{FieldMap, FieldMapper, Record, RecordStore};

/// An update pairing a modified source record with its linked target record.
#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    pub source: Record,
    pub target_id: String,
}

/// The three disjoint change sets for one run, with the demand counts
/// captured at plan time.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub to_create: Vec<Record>,
    pub to_update: Vec<PlannedUpdate>,
    /// Target-side identifiers confirmed deleted on the source.
    pub to_delete: Vec<String>,
    /// Size of the modified-source candidate set before subtracting records
    /// that already exist on the target: the number of source records that
    /// should exist on the target after the run.
    pub required_create: usize,
    /// Size of the matched-and-differing set.
    pub required_update: usize,
}

impl ReconciliationPlan {
    /// Total create+update demand; fixed once planning completes.
    pub fn records_required(&self) -> usize {
        self.required_create + self.required_update
    }

    /// Modified source records whose create demand is already satisfied by
    /// an existing linked target record. These need no write but count
    /// toward the synced total, since `required_create` counts the whole
    /// candidate set.
    pub fn already_linked(&self) -> usize {
        self.required_create - self.to_create.len()
    }
}

/// Plans one run's change sets against a source/target store pair.
pub struct ReconciliationPlanner<'a> {
    source: &'a dyn RecordStore,
    target: &'a dyn RecordStore,
    mapper: &'a dyn FieldMapper,
}

impl<'a> ReconciliationPlanner<'a> {
    pub fn new(
        source: &'a dyn RecordStore,
        target: &'a dyn RecordStore,
        mapper: &'a dyn FieldMapper,
    ) -> Self {
        Self {
            source,
            target,
            mapper,
        }
    }

    pub async fn plan(
        &self,
        table: &str,
        watermark: DateTime<Utc>,
    ) -> Result<ReconciliationPlan, StoreError> {
        let changed = self.source.fetch_modified_since(table, watermark).await?;
        let targets = self.target.snapshot(table).await?;

        let by_link: HashMap<&str, &Record> = targets
            .iter()
            .filter_map(|record| record.link_id.as_deref().map(|link| (link, record)))
            .collect();

        let mut plan = ReconciliationPlan {
            required_create: changed.len(),
            ..Default::default()
        };

        for record in &changed {
            match by_link.get(record.id.as_str()) {
                None => plan.to_create.push(record.clone()),
                Some(existing) => {
                    let mapped = self.mapper.to_target(record);
                    if !fields_match(&mapped, &existing.fields) {
                        plan.to_update.push(PlannedUpdate {
                            source: record.clone(),
                            target_id: existing.id.clone(),
                        });
                    }
                }
            }
        }
        plan.required_update = plan.to_update.len();

        plan.to_delete = self.confirm_deletions(table, &changed, &targets).await?;

        tracing::debug!(
            table,
            to_create = plan.to_create.len(),
            to_update = plan.to_update.len(),
            to_delete = plan.to_delete.len(),
            required = plan.records_required(),
            "reconciliation planned"
        );

        Ok(plan)
    }

    /// Two-phase deletion detection. Target records whose link id is absent
    /// from the modified-source window are only "unconfirmed": most are
    /// simply unchanged. Re-querying the source for exactly those ids
    /// separates extant records from true deletions. Target records with no
    /// link id have never been reconciled and are left alone.
    async fn confirm_deletions(
        &self,
        table: &str,
        changed: &[Record],
        targets: &[Record],
    ) -> Result<Vec<String>, StoreError> {
        let changed_ids: HashSet<&str> = changed.iter().map(|record| record.id.as_str()).collect();

        let unconfirmed: Vec<(&str, &str)> = targets
            .iter()
            .filter_map(|record| {
                record
                    .link_id
                    .as_deref()
                    .filter(|link| !changed_ids.contains(link))
                    .map(|link| (record.id.as_str(), link))
            })
            .collect();

        if unconfirmed.is_empty() {
            return Ok(Vec::new());
        }

        let link_ids: Vec<String> = unconfirmed
            .iter()
            .map(|(_, link)| (*link).to_string())
            .collect();
        let extant = self.source.fetch_by_ids(table, &link_ids).await?;
        let extant_ids: HashSet<&str> = extant.iter().map(|record| record.id.as_str()).collect();

        Ok(unconfirmed
            .into_iter()
            .filter(|(_, link)| !extant_ids.contains(link))
            .map(|(target_id, _)| target_id.to_string())
            .collect())
    }
}

/// Field-level equality between mapped source attributes and the target's
/// current attributes. A field missing on the target compares equal to an
/// explicit null.
fn fields_match(mapped: &FieldMap, target: &FieldMap) -> bool {
    mapped.iter().all(|(key, value)| {
        let current = target.get(key).unwrap_or(&serde_json::Value::Null);
        values_match(value, current)
    })
}

/// Type-normalized value comparison: numeric values compare by value and
/// datetime strings compare at second precision, so representation drift
/// between the stores does not flag every record for update.
fn values_match(left: &serde_json::Value, right: &serde_json::Value) -> bool {
    use serde_json::Value;

    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::String(a), Value::String(b)) => {
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => a.timestamp() == b.timestamp(),
                _ => a == b,
            }
        }
        _ => left == right,
    }
}
