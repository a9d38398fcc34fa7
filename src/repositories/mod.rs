//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for
//! persisted entities.

pub mod sync_run;

pub use sync_run::{FailedIds, SyncRunRepository};
