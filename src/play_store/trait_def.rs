//! Store trait definitions.

use super::models::{InsertOutcome, PlayFilter, PlayStoreStats};
use crate::play_event::{EnrichedEvent, PlayEvent, Source, StoredPlay};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Append-only log of every ingested play.
pub trait RawPlayStore: Send + Sync {
    /// The `n` most recent play timestamps recorded for `source`, newest first.
    fn recent_timestamps(&self, source: Source, n: usize) -> Result<Vec<DateTime<Utc>>>;

    /// Rows matching `filter`, newest first.
    ///
    /// A row that cannot be decoded fails the whole read with a
    /// [`super::DecodeError`].
    fn query_all(&self, filter: &PlayFilter) -> Result<Vec<StoredPlay>>;

    /// Writes `rows` keyed by `insert_ids` in one transaction.
    ///
    /// Invalid rows are reported in [`InsertOutcome::rejected`] and do not
    /// prevent the others from being written. Rows whose key already exists
    /// are skipped. The two slices must have the same length.
    fn batch_insert(&self, rows: &[PlayEvent], insert_ids: &[String]) -> Result<InsertOutcome>;

    /// Writes previously exported rows verbatim, nullable source included.
    fn import(&self, rows: &[StoredPlay]) -> Result<InsertOutcome>;

    fn stats(&self) -> Result<PlayStoreStats>;
}

/// Derived, fully recomputed view of the log.
pub trait EnrichedPlayStore: Send + Sync {
    /// Replaces every enriched row with `rows`.
    ///
    /// Readers see either the previous contents or the new ones, never a mix.
    fn atomic_replace(&self, rows: &[EnrichedEvent]) -> Result<()>;

    /// Every enriched row, in the order they were published.
    fn load_all(&self) -> Result<Vec<EnrichedEvent>>;

    fn count(&self) -> Result<usize>;
}
