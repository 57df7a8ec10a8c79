//! Idempotent, chunked writes to the raw log.

use crate::play_event::{PlayEvent, Source};
use crate::play_store::{RawPlayStore, RowError};
use crate::server::metrics;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info};

/// Default number of rows written per store call.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Deterministic row identifier.
///
/// Derived from the play's source, timestamp, track and artist so that
/// resubmitting the same play yields the same id.
pub fn insert_id(play: &PlayEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(play.source.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(play.timestamp.timestamp_millis().to_be_bytes());
    hasher.update(play.track.as_bytes());
    hasher.update([0u8]);
    hasher.update(play.artist.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Error)]
pub enum AppendError {
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),

    #[error("{} of {} {source_tag} rows rejected: {}", .rejected.len(), .submitted, summarize(.rejected))]
    RowsRejected {
        source_tag: Source,
        submitted: usize,
        appended: usize,
        rejected: Vec<RowError>,
    },
}

pub(crate) fn summarize(rejected: &[RowError]) -> String {
    rejected
        .iter()
        .map(|r| format!("#{} ({})", r.index, r.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub appended: usize,
    pub deduplicated: usize,
    pub chunks: usize,
    /// True when nothing was written because of dry-run.
    pub dry_run: bool,
}

pub struct Appender<'a> {
    store: &'a dyn RawPlayStore,
    chunk_size: usize,
    dry_run: bool,
}

impl<'a> Appender<'a> {
    pub fn new(store: &'a dyn RawPlayStore, chunk_size: usize, dry_run: bool) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            dry_run,
        }
    }

    /// Writes `plays` for `source`.
    ///
    /// Rows already present are skipped. Rejected rows are collected across
    /// every chunk and reported once at the end; rows accepted before or
    /// after them stay written.
    pub fn append(&self, source: Source, plays: &[PlayEvent]) -> Result<AppendReport, AppendError> {
        if plays.is_empty() {
            return Ok(AppendReport {
                dry_run: self.dry_run,
                ..Default::default()
            });
        }
        if self.dry_run {
            info!("Dry run: not appending {} {} plays", plays.len(), source);
            return Ok(AppendReport {
                dry_run: true,
                ..Default::default()
            });
        }

        let mut report = AppendReport::default();
        let mut rejected = Vec::new();
        for (chunk_index, chunk) in plays.chunks(self.chunk_size).enumerate() {
            let offset = chunk_index * self.chunk_size;
            let ids = chunk.iter().map(insert_id).collect::<Vec<_>>();
            let outcome = self
                .store
                .batch_insert(chunk, &ids)
                .map_err(AppendError::Store)?;

            report.chunks += 1;
            report.appended += outcome.inserted;
            report.deduplicated += outcome.deduplicated;
            for mut row_error in outcome.rejected {
                row_error.index += offset;
                error!(
                    "Rejected {} play #{} ({}): {}",
                    source, row_error.index, row_error.insert_id, row_error.reason
                );
                rejected.push(row_error);
            }
        }

        metrics::record_append(
            source.as_str(),
            report.appended,
            report.deduplicated,
            rejected.len(),
        );
        info!(
            "Appended {} {} plays in {} chunks ({} already present, {} rejected)",
            report.appended,
            source,
            report.chunks,
            report.deduplicated,
            rejected.len()
        );

        if rejected.is_empty() {
            Ok(report)
        } else {
            Err(AppendError::RowsRejected {
                source_tag: source,
                submitted: plays.len(),
                appended: report.appended,
                rejected,
            })
        }
    }
}
