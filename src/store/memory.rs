//! In-memory record store
//!
//! A self-contained [`RecordStore`] used as the reference implementation
//! and as the store double in engine tests. Records live in per-table maps;
//! failures can be injected per record to exercise the executor's
//! isolation behavior.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::{FieldMap, Record, RecordStore};

/// In-memory store keyed by table name.
pub struct MemoryStore {
    /// Field under which this store keeps the counterpart record's id.
    link_field: String,
    tables: Mutex<HashMap<String, BTreeMap<String, Record>>>,
    next_id: AtomicU64,
    /// Injected failures: record key -> error message. Creates are keyed by
    /// the incoming link-field value, updates/deletes by record id.
    failures: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new(link_field: &str) -> Self {
        Self {
            link_field: link_field.to_string(),
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Insert records directly, bypassing the write path.
    pub fn seed(&self, table: &str, records: Vec<Record>) {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        for record in records {
            entry.insert(record.id.clone(), record);
        }
    }

    /// Current contents of a table, ordered by record id.
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Make the next write touching `key` fail with the given message.
    /// The key is the link-field value for creates and the record id for
    /// updates and deletes.
    pub fn inject_failure(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), message.to_string());
    }

    fn check_failure(&self, key: &str) -> Result<(), StoreError> {
        if let Some(message) = self.failures.lock().unwrap().get(key) {
            return Err(StoreError::api(500, Some(message.clone())));
        }
        Ok(())
    }

    fn allocate_id(&self) -> String {
        format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_modified_since(
        &self,
        table: &str,
        watermark: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records(table)
            .into_iter()
            .filter(|record| record.modified_at >= watermark)
            .collect())
    }

    async fn fetch_by_ids(&self, table: &str, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let records = tables.get(table);
        Ok(ids
            .iter()
            .filter_map(|id| records.and_then(|table| table.get(id)).cloned())
            .collect())
    }

    async fn snapshot(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self.records(table))
    }

    async fn create(&self, table: &str, fields: &FieldMap) -> Result<String, StoreError> {
        let link_id = fields
            .get(&self.link_field)
            .and_then(|value| value.as_str())
            .map(str::to_string);

        if let Some(link) = &link_id {
            self.check_failure(link)?;
        }

        let id = self.allocate_id();
        let record = Record {
            id: id.clone(),
            link_id,
            modified_at: Utc::now(),
            fields: fields.clone(),
        };

        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id.clone(), record);

        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        self.check_failure(id)?;

        let mut tables = self.tables.lock().unwrap();
        let record = tables
            .get_mut(table)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        for (key, value) in fields {
            record.fields.insert(key.clone(), value.clone());
        }
        record.modified_at = Utc::now();

        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        self.check_failure(id)?;

        let mut tables = self.tables.lock().unwrap();
        let removed = tables
            .get_mut(table)
            .and_then(|records| records.remove(id));

        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn create_links_records_through_the_link_field() {
        let store = MemoryStore::new("source_id");
        let id = store
            .create("contacts", &fields(&[("source_id", json!("pg-7")), ("name", json!("Ada"))]))
            .await
            .unwrap();

        let records = store.records("contacts");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].link_id.as_deref(), Some("pg-7"));
    }

    #[tokio::test]
    async fn delete_missing_record_reports_not_found() {
        let store = MemoryStore::new("source_id");
        let err = store.delete("contacts", "absent").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn injected_failures_hit_matching_writes_only() {
        let store = MemoryStore::new("source_id");
        store.inject_failure("pg-2", "disk full");

        store
            .create("contacts", &fields(&[("source_id", json!("pg-1"))]))
            .await
            .unwrap();
        let err = store
            .create("contacts", &fields(&[("source_id", json!("pg-2"))]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(store.records("contacts").len(), 1);
    }

    #[tokio::test]
    async fn fetch_modified_since_filters_by_watermark() {
        let store = MemoryStore::new("source_id");
        let old = Record {
            id: "r-1".to_string(),
            link_id: None,
            modified_at: Utc::now() - chrono::Duration::days(30),
            fields: FieldMap::new(),
        };
        let fresh = Record {
            id: "r-2".to_string(),
            link_id: None,
            modified_at: Utc::now(),
            fields: FieldMap::new(),
        };
        store.seed("contacts", vec![old, fresh]);

        let watermark = Utc::now() - chrono::Duration::days(1);
        let windowed = store
            .fetch_modified_since("contacts", watermark)
            .await
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].id, "r-2");
    }
}
