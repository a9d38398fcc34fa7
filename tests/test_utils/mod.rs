//! Test utilities for database and engine testing.
//!
//! Provides an in-memory SQLite ledger with migrations applied, and a
//! harness wiring two in-memory stores to a [`SyncEngine`].

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

use accord::engine::SyncEngine;
use accord::repositories::SyncRunRepository;
use accord::store::{
    ConnectionLifecycle, FieldMap, MapperRegistry, MemoryStore, NoopSessions, Record, TableMapping,
};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Engine harness over two in-memory stores sharing one ledger.
///
/// The primary store links records through `remote_id`, the remote store
/// through `source_id`; the registered mappers for the `contacts` table
/// copy the `name` field and stamp the link field.
#[allow(dead_code)]
pub struct EngineHarness {
    pub db: DatabaseConnection,
    pub primary: Arc<MemoryStore>,
    pub remote: Arc<MemoryStore>,
    pub engine: SyncEngine,
}

#[allow(dead_code)]
pub async fn engine_harness() -> Result<EngineHarness> {
    engine_harness_with_sessions(Arc::new(NoopSessions)).await
}

#[allow(dead_code)]
pub async fn engine_harness_with_sessions(
    sessions: Arc<dyn ConnectionLifecycle>,
) -> Result<EngineHarness> {
    let db = setup_test_db().await?;
    let primary = Arc::new(MemoryStore::new("remote_id"));
    let remote = Arc::new(MemoryStore::new("source_id"));

    let mut registry = MapperRegistry::new();
    registry.register(
        "contacts",
        TableMapping {
            to_remote: Arc::new(|record: &Record| mapped_fields(record, "source_id")),
            to_primary: Arc::new(|record: &Record| mapped_fields(record, "remote_id")),
        },
    );

    let engine = SyncEngine::new(
        SyncRunRepository::new(db.clone()),
        primary.clone(),
        remote.clone(),
        registry,
        sessions,
    );

    Ok(EngineHarness {
        db,
        primary,
        remote,
        engine,
    })
}

fn mapped_fields(record: &Record, link_field: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    if let Some(name) = record.fields.get("name") {
        fields.insert("name".to_string(), name.clone());
    }
    fields.insert(link_field.to_string(), serde_json::json!(record.id));
    fields
}

/// A source-side record carrying just a name.
#[allow(dead_code)]
pub fn source_record(id: &str, name: &str, modified_at: DateTime<Utc>) -> Record {
    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), serde_json::json!(name));
    Record {
        id: id.to_string(),
        link_id: None,
        modified_at,
        fields,
    }
}

/// A target-side record already linked to a source record.
#[allow(dead_code)]
pub fn linked_record(
    id: &str,
    link_id: &str,
    link_field: &str,
    name: &str,
    modified_at: DateTime<Utc>,
) -> Record {
    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), serde_json::json!(name));
    fields.insert(link_field.to_string(), serde_json::json!(link_id));
    Record {
        id: id.to_string(),
        link_id: Some(link_id.to_string()),
        modified_at,
        fields,
    }
}

/// A timestamp safely inside the bootstrap window but before any run.
#[allow(dead_code)]
pub fn recently() -> DateTime<Utc> {
    Utc::now() - Duration::minutes(5)
}

/// A timestamp older than the 15-year bootstrap lookback.
#[allow(dead_code)]
pub fn ancient() -> DateTime<Utc> {
    Utc::now() - Duration::days(16 * 365)
}
