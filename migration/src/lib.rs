//! Database migrations for the accord run ledger.

pub use sea_orm_migration::prelude::*;

mod m2025_06_10_000001_create_sync_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m2025_06_10_000001_create_sync_runs::Migration)]
    }
}
