//! # Data Models
//!
//! SeaORM entity models persisted by the engine.

pub mod sync_run;

pub use sync_run::Entity as SyncRun;
pub use sync_run::{RunStatus, SyncDirection};
