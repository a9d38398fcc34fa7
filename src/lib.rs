//! # Accord
//!
//! Reconciliation engine keeping a primary relational store and a remote
//! API-backed store eventually consistent in either direction, with a
//! persisted run ledger for auditing and incremental watermarks.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod store;
pub use migration;
