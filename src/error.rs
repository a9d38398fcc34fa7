//! # Error Handling
//!
//! Two error tiers run through the engine. Per-record errors are
//! [`StoreError`]s raised while applying a single record; the executor
//! records them into the run's failed-id maps and keeps going. Structural
//! errors ([`EngineError`]) abort the run: they are written to the ledger
//! once at the orchestrator boundary and then propagated to the caller.

use thiserror::Error;

/// Errors from the run ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input rejected before any row was written.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A status transition the state machine does not allow.
    #[error("run {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        id: uuid::Uuid,
        from: String,
        to: String,
    },

    /// The underlying ledger write or read failed.
    #[error("ledger persistence failed: {source}")]
    Persistence {
        #[from]
        source: sea_orm::DbErr,
    },
}

impl LedgerError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }
}

/// Errors from a record store, raised on a per-record basis.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist in the store.
    #[error("record '{id}' not found")]
    NotFound { id: String },

    /// The store answered with a non-success status.
    #[error("store returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// No session is established, or the session could not be opened/closed.
    #[error("session error: {message}")]
    Session { message: String },

    /// Transport-level failure talking to the store.
    #[error("network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// The store's response could not be decoded.
    #[error("malformed response: {message}")]
    Malformed { message: String },
}

impl StoreError {
    /// Build an API error from a status and optional response body,
    /// truncating the body so error messages stay log-sized.
    pub fn api(status: u16, body: Option<String>) -> Self {
        let message = body
            .map(|text| {
                if text.chars().count() > 200 {
                    let truncated: String = text.chars().take(200).collect();
                    format!("{truncated}...")
                } else {
                    text
                }
            })
            .unwrap_or_else(|| "no response body".to_string());
        StoreError::Api { status, message }
    }

    pub fn session<S: Into<String>>(message: S) -> Self {
        StoreError::Session {
            message: message.into(),
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        StoreError::Malformed {
            message: message.into(),
        }
    }
}

/// Structural (run-level) errors surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// No field mapping is registered for the requested table.
    #[error("no mapping registered for table '{table}'")]
    UnknownTable { table: String },

    /// The remote session could not be opened.
    #[error("failed to open store session: {source}")]
    Connection {
        #[source]
        source: StoreError,
    },

    /// Change detection against one of the stores failed.
    #[error("planning failed for table '{table}': {source}")]
    Plan {
        table: String,
        #[source]
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_truncates_long_bodies() {
        let err = StoreError::api(500, Some("x".repeat(500)));
        match err {
            StoreError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.ends_with("..."));
                assert!(message.chars().count() <= 203);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn api_error_without_body() {
        let err = StoreError::api(404, None);
        assert_eq!(err.to_string(), "store returned status 404: no response body");
    }

    #[test]
    fn ledger_error_display_names_states() {
        let err = LedgerError::InvalidTransition {
            id: uuid::Uuid::nil(),
            from: "completed".to_string(),
            to: "in_progress".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("'completed'"));
        assert!(text.contains("'in_progress'"));
    }
}
