//! Watermark resolution
//!
//! Derives the incremental cutoff for a (table, direction) pair from the
//! run ledger: the `ran_on` of the most recent completed run. Failed and
//! in-progress runs are ignored, so a failed run's window is re-scanned in
//! full on the next attempt.

use chrono::{DateTime, Duration, Utc};

use crate::error::LedgerError;
use crate::models::sync_run::SyncDirection;
use crate::repositories::SyncRunRepository;

/// How far back the first run of a never-synced table reaches.
///
/// A fixed far-past lookback rather than "now": bootstrapping from "now"
/// would silently skip every historical record.
pub const BOOTSTRAP_LOOKBACK_DAYS: i64 = 15 * 365;

/// Watermark used when no completed run exists for the pair.
pub fn bootstrap_watermark(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(BOOTSTRAP_LOOKBACK_DAYS)
}

/// Resolves incremental watermarks from the run ledger.
pub struct WatermarkResolver<'a> {
    runs: &'a SyncRunRepository,
}

impl<'a> WatermarkResolver<'a> {
    pub fn new(runs: &'a SyncRunRepository) -> Self {
        Self { runs }
    }

    /// The cutoff timestamp for the next incremental run of the pair.
    pub async fn resolve(
        &self,
        table: &str,
        direction: SyncDirection,
    ) -> Result<DateTime<Utc>, LedgerError> {
        let last = self.runs.last_successful_run(table, direction).await?;

        let watermark = match last {
            Some(run) => run.ran_on.with_timezone(&Utc),
            None => bootstrap_watermark(Utc::now()),
        };

        tracing::debug!(table, direction = %direction, %watermark, "watermark resolved");

        Ok(watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_reaches_fifteen_years_back() {
        let now = Utc::now();
        let watermark = bootstrap_watermark(now);
        assert_eq!(now - watermark, Duration::days(15 * 365));
    }
}
