//! Store boundary
//!
//! Capabilities the engine consumes from the two record stores: windowed
//! and keyed reads, per-record writes, field mapping between the stores'
//! schemas, and scoped session lifecycle around a unit of work.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::RemoteStore;

/// Attribute map for one record, keyed by field name.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// A record as exchanged with either store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The record's identifier in its own store.
    pub id: String,

    /// Identifier of the counterpart record in the other store, when linked.
    #[serde(default)]
    pub link_id: Option<String>,

    /// When the record was last created or modified in its store.
    pub modified_at: DateTime<Utc>,

    /// The record's attributes.
    #[serde(default)]
    pub fields: FieldMap,
}

/// Read/write capability of a record store.
///
/// Every operation succeeds or fails for a single record; batch semantics
/// are the engine's concern.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records created or modified at-or-after the watermark.
    async fn fetch_modified_since(
        &self,
        table: &str,
        watermark: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Fetch records by their store-side identifiers. Identifiers with no
    /// record are simply absent from the result, not an error.
    async fn fetch_by_ids(&self, table: &str, ids: &[String]) -> Result<Vec<Record>, StoreError>;

    /// All records currently in the table.
    async fn snapshot(&self, table: &str) -> Result<Vec<Record>, StoreError>;

    /// Create a record, returning its new store-side identifier.
    async fn create(&self, table: &str, fields: &FieldMap) -> Result<String, StoreError>;

    /// Overwrite the given fields on an existing record.
    async fn update(&self, table: &str, id: &str, fields: &FieldMap) -> Result<(), StoreError>;

    /// Delete a record. Deleting a record that is already gone yields
    /// [`StoreError::NotFound`].
    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError>;
}

/// Converts a source-side record into the target store's attributes.
///
/// One mapper exists per synchronized table per direction; the mapped
/// fields also define the update-equality predicate, so a target record is
/// only updated when at least one mapped field differs.
pub trait FieldMapper: Send + Sync {
    fn to_target(&self, record: &Record) -> FieldMap;
}

impl<F> FieldMapper for F
where
    F: Fn(&Record) -> FieldMap + Send + Sync,
{
    fn to_target(&self, record: &Record) -> FieldMap {
        self(record)
    }
}

/// Mapper pair for one synchronized table.
#[derive(Clone)]
pub struct TableMapping {
    pub to_remote: Arc<dyn FieldMapper>,
    pub to_primary: Arc<dyn FieldMapper>,
}

/// Registry of synchronized tables and their field mappers.
#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappings: HashMap<String, TableMapping>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    /// Register the mapper pair for a table, replacing any existing entry.
    pub fn register(&mut self, table: &str, mapping: TableMapping) {
        self.mappings.insert(table.to_string(), mapping);
    }

    pub fn get(&self, table: &str) -> Option<&TableMapping> {
        self.mappings.get(table)
    }

    /// Registered table names, sorted for stable ordering.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<_> = self.mappings.keys().cloned().collect();
        tables.sort();
        tables
    }
}

/// Scoped session lifecycle around a unit of work against a store.
#[async_trait]
pub trait ConnectionLifecycle: Send + Sync {
    /// Open a session. The returned lease must be closed on every exit
    /// path once the unit of work ends.
    async fn open(&self) -> Result<Box<dyn SessionLease>, StoreError>;
}

/// A held store session.
#[async_trait]
pub trait SessionLease: Send + Sync {
    async fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// Lifecycle for stores that need no session handshake, such as the
/// primary database pool or in-memory stores in tests.
pub struct NoopSessions;

struct NoopLease;

#[async_trait]
impl ConnectionLifecycle for NoopSessions {
    async fn open(&self) -> Result<Box<dyn SessionLease>, StoreError> {
        Ok(Box::new(NoopLease))
    }
}

#[async_trait]
impl SessionLease for NoopLease {
    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
