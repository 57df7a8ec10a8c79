//! Types exchanged with the play stores.

use crate::play_event::Source;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Selection for reads from the raw log. Empty filter means every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayFilter {
    pub source: Option<Source>,
    /// Inclusive lower bound on the play timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the play timestamp.
    pub until: Option<DateTime<Utc>>,
}

/// A row the store refused to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Position of the row in the submitted batch.
    pub index: usize,
    pub insert_id: String,
    pub reason: String,
}

/// Result of a batch insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    /// Rows whose `insert_id` was already present.
    pub deduplicated: usize,
    pub rejected: Vec<RowError>,
}

impl InsertOutcome {
    pub fn merge(&mut self, other: InsertOutcome) {
        self.inserted += other.inserted;
        self.deduplicated += other.deduplicated;
        self.rejected.extend(other.rejected);
    }
}

/// A stored column that cannot be turned back into a typed play.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Row {insert_id}: column {column} has unreadable value: {message}")]
    Column {
        insert_id: String,
        column: &'static str,
        message: String,
    },

    #[error("Row {insert_id}: unknown source tag '{value}'")]
    UnknownSource { insert_id: String, value: String },

    #[error("Row {insert_id}: column {column} value {value} is out of range")]
    OutOfRange {
        insert_id: String,
        column: &'static str,
        value: i64,
    },
}

/// Row counts, used for startup logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayStoreStats {
    pub rows: usize,
    pub rows_without_source: usize,
}
