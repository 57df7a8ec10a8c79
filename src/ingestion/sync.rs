//! One incremental sync of a single source.

use super::appender::{summarize, AppendError, Appender};
use super::candidates::CandidateSource;
use super::watermark::{self, Watermark, WatermarkPolicy};
use crate::config::IngestionSettings;
use crate::group_key::group_key;
use crate::play_event::{normalize, PlayEvent, Source};
use crate::play_store::{RawPlayStore, RowError};
use crate::retry::Retryable;
use crate::server::metrics;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_WATERMARK_DEPTH: usize = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetch error: {0:#}")]
    Fetch(anyhow::Error),

    #[error("Store error: {0:#}")]
    Store(anyhow::Error),

    #[error("{} {source_tag} rows rejected by the store: {}", .rejected.len(), summarize(.rejected))]
    RowsRejected {
        source_tag: Source,
        appended: usize,
        rejected: Vec<RowError>,
    },

    #[error("Metadata lookup failed for {failed} {source_tag} plays ({appended} older appended, {deferred} newer deferred)")]
    MetadataFailures {
        source_tag: Source,
        failed: usize,
        appended: usize,
        deferred: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(_) | SyncError::Store(_) | SyncError::MetadataFailures { .. } => true,
            SyncError::RowsRejected { .. } | SyncError::Config(_) => false,
        }
    }
}

impl From<AppendError> for SyncError {
    fn from(err: AppendError) -> Self {
        match err {
            AppendError::Store(e) => SyncError::Store(e),
            AppendError::RowsRejected {
                source_tag,
                appended,
                rejected,
                ..
            } => SyncError::RowsRejected {
                source_tag,
                appended,
                rejected,
            },
        }
    }
}

/// Per-run knobs, resolved from configuration for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub policy: WatermarkPolicy,
    pub watermark_depth: usize,
    pub chunk_size: usize,
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn for_source(settings: &IngestionSettings, source: Source, dry_run: bool) -> Self {
        Self {
            policy: settings.policy_for(source),
            watermark_depth: settings.watermark_depth,
            chunk_size: settings.append_chunk_size,
            dry_run,
        }
    }
}

/// Counts of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    /// Candidates that could not be normalized.
    pub invalid: usize,
    /// Repeats dropped before the watermark check.
    pub collapsed: usize,
    /// Candidates already in the log.
    pub skipped: usize,
    pub accepted: usize,
    pub metadata_failures: usize,
    /// Accepted plays newer than a metadata failure, left for the next run.
    pub deferred: usize,
    pub appended: usize,
    pub deduplicated: usize,
    pub dry_run: bool,
}

/// Collapses runs of consecutive plays sharing a group key.
///
/// `plays` must be oldest first; the newest play of each run is kept.
pub fn collapse_repeats(plays: Vec<PlayEvent>) -> (Vec<PlayEvent>, usize) {
    let total = plays.len();
    let mut last_key: Option<String> = None;
    let mut kept: Vec<PlayEvent> = Vec::with_capacity(total);
    for play in plays {
        let key = group_key(&play.track, &play.artist);
        if last_key.as_deref() == Some(key.as_str()) {
            if let Some(previous) = kept.last_mut() {
                debug!(
                    "Collapsing repeated {} play '{}' at {}",
                    previous.source, previous.track, previous.timestamp
                );
                *previous = play;
            }
            continue;
        }
        last_key = Some(key);
        kept.push(play);
    }
    let collapsed = total - kept.len();
    (kept, collapsed)
}

/// Fetches, filters and appends the new plays of `candidates.source()`.
///
/// Candidates that fail normalization are skipped. Metadata is looked up
/// oldest first and the first failure stops the lookups: only the older plays
/// are appended, so the watermark never moves past the failed play. The run
/// then fails with [`SyncError::MetadataFailures`] so that it gets retried.
pub fn sync_source(
    candidates: &dyn CandidateSource,
    store: &dyn RawPlayStore,
    options: &SyncOptions,
    now: DateTime<Utc>,
) -> Result<SyncReport, SyncError> {
    let source = candidates.source();
    if source == Source::Unknown {
        return Err(SyncError::Config(format!("cannot sync source {}", source)));
    }
    if !(1..=MAX_WATERMARK_DEPTH).contains(&options.watermark_depth) {
        return Err(SyncError::Config(format!(
            "watermark depth {} is outside 1..={}",
            options.watermark_depth, MAX_WATERMARK_DEPTH
        )));
    }

    let mut report = SyncReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    let raw = candidates.fetch().map_err(SyncError::Fetch)?;
    report.fetched = raw.len();

    let mut plays = Vec::with_capacity(raw.len());
    for (index, candidate) in raw.iter().enumerate() {
        match normalize(source, candidate, now) {
            Ok(play) => plays.push(play),
            Err(err) => {
                warn!("Skipping {} candidate #{} '{}': {}", source, index, candidate.track, err);
                report.invalid += 1;
            }
        }
    }

    let reverse_chronological = candidates.reverse_chronological();
    if source == Source::Shazam {
        if reverse_chronological {
            plays.reverse();
        }
        watermark::sort_oldest_first(&mut plays);
        let (kept, collapsed) = collapse_repeats(plays);
        plays = kept;
        report.collapsed = collapsed;
    }

    let current = Watermark::load(store, source, options.watermark_depth)
        .map_err(SyncError::Store)?;
    let outcome = watermark::filter(
        source,
        options.policy,
        plays,
        &current,
        reverse_chronological && source != Source::Shazam,
    );
    report.skipped = outcome.skipped;
    report.accepted = outcome.accepted.len();

    let mut completed = Vec::with_capacity(outcome.accepted.len());
    let mut pending = outcome.accepted.into_iter();
    for play in pending.by_ref() {
        let description = format!("'{}' at {}", play.track, play.timestamp);
        match candidates.complete_metadata(play) {
            Ok(play) => completed.push(play),
            Err(err) => {
                warn!("Metadata lookup failed for {} play {}: {:#}", source, description, err);
                report.metadata_failures += 1;
                break;
            }
        }
    }
    report.deferred = pending.len();
    if report.deferred > 0 {
        debug!(
            "Deferring {} newer {} plays to the next run",
            report.deferred, source
        );
    }

    metrics::record_candidates(source.as_str(), "accepted", report.accepted);
    metrics::record_candidates(
        source.as_str(),
        "skipped",
        report.skipped + report.collapsed,
    );
    metrics::record_candidates(source.as_str(), "invalid", report.invalid);
    metrics::record_candidates(source.as_str(), "deferred", report.deferred);

    let appender = Appender::new(store, options.chunk_size, options.dry_run);
    let appended = appender.append(source, &completed)?;
    report.appended = appended.appended;
    report.deduplicated = appended.deduplicated;

    info!(
        "Synced {}: {} fetched, {} invalid, {} collapsed, {} skipped, {} accepted, {} failed, {} deferred, {} appended, {} already present{}",
        source,
        report.fetched,
        report.invalid,
        report.collapsed,
        report.skipped,
        report.accepted,
        report.metadata_failures,
        report.deferred,
        report.appended,
        report.deduplicated,
        if report.dry_run { " (dry run)" } else { "" }
    );

    if report.metadata_failures > 0 {
        return Err(SyncError::MetadataFailures {
            source_tag: source,
            failed: report.metadata_failures,
            appended: report.appended,
            deferred: report.deferred,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::play_event::RawCandidate;
    use crate::play_store::{PlayFilter, SqliteRawPlayStore};
    use anyhow::{anyhow, Result};
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeSource {
        source: Source,
        candidates: Vec<RawCandidate>,
        newest_first: bool,
        failing_tracks: Vec<String>,
        fetch_fails: bool,
        metadata_calls: Mutex<usize>,
    }

    impl FakeSource {
        fn new(source: Source, candidates: Vec<RawCandidate>) -> Self {
            Self {
                source,
                candidates,
                newest_first: false,
                failing_tracks: Vec::new(),
                fetch_fails: false,
                metadata_calls: Mutex::new(0),
            }
        }
    }

    impl CandidateSource for FakeSource {
        fn source(&self) -> Source {
            self.source
        }

        fn fetch(&self) -> Result<Vec<RawCandidate>> {
            if self.fetch_fails {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.candidates.clone())
        }

        fn reverse_chronological(&self) -> bool {
            self.newest_first
        }

        fn complete_metadata(&self, mut play: PlayEvent) -> Result<PlayEvent> {
            *self.metadata_calls.lock().unwrap() += 1;
            if self.failing_tracks.contains(&play.track) {
                return Err(anyhow!("lookup timed out"));
            }
            play.album = "Looked up".to_string();
            Ok(play)
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn candidate(track: &str, secs: i64) -> RawCandidate {
        RawCandidate {
            track: track.to_string(),
            artist: "Artist".to_string(),
            played_at: Some(at(secs)),
            ..Default::default()
        }
    }

    fn options(policy: WatermarkPolicy) -> SyncOptions {
        SyncOptions {
            policy,
            watermark_depth: 100,
            chunk_size: 10_000,
            dry_run: false,
        }
    }

    fn create_tmp_store() -> (SqliteRawPlayStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteRawPlayStore::new(temp_dir.path().join("plays.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_resync_is_idempotent() {
        let (store, _tmp) = create_tmp_store();
        let fake = FakeSource::new(
            Source::Spotify,
            vec![candidate("a", 0), candidate("b", 10), candidate("c", 20)],
        );

        let first = sync_source(&fake, &store, &options(WatermarkPolicy::Multi), at(100)).unwrap();
        assert_eq!(first.appended, 3);

        let second = sync_source(&fake, &store, &options(WatermarkPolicy::Multi), at(200)).unwrap();
        assert_eq!(second.accepted, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(store.stats().unwrap().rows, 3);
    }

    #[test]
    fn test_invalid_candidates_are_skipped() {
        let (store, _tmp) = create_tmp_store();
        let mut no_time = candidate("x", 0);
        no_time.played_at = None;
        let fake = FakeSource::new(Source::Lastfm, vec![candidate("a", 0), no_time]);

        let report =
            sync_source(&fake, &store, &options(WatermarkPolicy::Single), at(100)).unwrap();
        assert_eq!(report.invalid, 1);
        assert_eq!(report.appended, 1);
    }

    #[test]
    fn test_metadata_failure_defers_newer_plays() {
        let (store, _tmp) = create_tmp_store();
        let mut fake = FakeSource::new(
            Source::Spotify,
            vec![candidate("a", 0), candidate("b", 10), candidate("c", 20)],
        );
        fake.failing_tracks = vec!["b".to_string()];

        let err =
            sync_source(&fake, &store, &options(WatermarkPolicy::Multi), at(100)).unwrap_err();
        match &err {
            SyncError::MetadataFailures {
                failed,
                appended,
                deferred,
                ..
            } => {
                assert_eq!(*failed, 1);
                assert_eq!(*appended, 1);
                assert_eq!(*deferred, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.is_retryable());
        assert_eq!(*fake.metadata_calls.lock().unwrap(), 2);

        // The next run picks up the failed play and the deferred one
        fake.failing_tracks.clear();
        let report =
            sync_source(&fake, &store, &options(WatermarkPolicy::Multi), at(200)).unwrap();
        assert_eq!(report.appended, 2);
        let rows = store.query_all(&PlayFilter::default()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.album == "Looked up"));
    }

    #[test]
    fn test_failed_play_is_not_lost_behind_single_watermark() {
        let (store, _tmp) = create_tmp_store();
        let mut fake = FakeSource::new(
            Source::Lastfm,
            vec![candidate("old", 10), candidate("new", 20)],
        );
        fake.failing_tracks = vec!["old".to_string()];

        let err =
            sync_source(&fake, &store, &options(WatermarkPolicy::Single), at(100)).unwrap_err();
        assert!(matches!(
            err,
            SyncError::MetadataFailures {
                failed: 1,
                appended: 0,
                deferred: 1,
                ..
            }
        ));
        assert_eq!(store.stats().unwrap().rows, 0);

        fake.failing_tracks.clear();
        let report =
            sync_source(&fake, &store, &options(WatermarkPolicy::Single), at(200)).unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(report.appended, 2);

        let mut tracks = store
            .query_all(&PlayFilter::default())
            .unwrap()
            .into_iter()
            .map(|p| p.track)
            .collect::<Vec<_>>();
        tracks.sort();
        assert_eq!(tracks, vec!["new", "old"]);
    }

    #[test]
    fn test_fetch_failure_is_retryable() {
        let (store, _tmp) = create_tmp_store();
        let mut fake = FakeSource::new(Source::Youtube, Vec::new());
        fake.fetch_fails = true;

        let err =
            sync_source(&fake, &store, &options(WatermarkPolicy::Single), at(0)).unwrap_err();
        assert!(matches!(err, SyncError::Fetch(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_shazam_repeats_collapse_before_guard() {
        let (store, _tmp) = create_tmp_store();
        let mut fake = FakeSource::new(
            Source::Shazam,
            vec![
                candidate("again", 30),
                candidate("Again ", 20),
                candidate("first", 10),
                candidate("again", 0),
            ],
        );
        fake.newest_first = true;

        let report =
            sync_source(&fake, &store, &options(WatermarkPolicy::Single), at(100)).unwrap();
        assert_eq!(report.collapsed, 1);
        assert_eq!(report.appended, 3);

        let mut timestamps = store
            .query_all(&PlayFilter::default())
            .unwrap()
            .into_iter()
            .map(|p| p.timestamp)
            .collect::<Vec<_>>();
        timestamps.sort();
        assert_eq!(timestamps, vec![at(0), at(10), at(30)]);
    }

    #[test]
    fn test_collapse_repeats_keeps_newest_of_run() {
        let plays = vec![
            PlayEvent::new(Source::Shazam, "a", "x", at(0)),
            PlayEvent::new(Source::Shazam, "A", "X", at(1)),
            PlayEvent::new(Source::Shazam, "b", "x", at(2)),
            PlayEvent::new(Source::Shazam, "a", "x", at(3)),
        ];
        let (kept, collapsed) = collapse_repeats(plays);
        assert_eq!(collapsed, 1);
        assert_eq!(
            kept.iter().map(|p| p.timestamp).collect::<Vec<_>>(),
            vec![at(1), at(2), at(3)]
        );
    }

    #[test]
    fn test_depth_out_of_range_is_config_error() {
        let (store, _tmp) = create_tmp_store();
        let fake = FakeSource::new(Source::Spotify, vec![candidate("a", 0)]);
        let mut opts = options(WatermarkPolicy::Multi);
        opts.watermark_depth = 101;

        let err = sync_source(&fake, &store, &opts, at(0)).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_dry_run_appends_nothing() {
        let (store, _tmp) = create_tmp_store();
        let fake = FakeSource::new(Source::Spotify, vec![candidate("a", 0)]);
        let mut opts = options(WatermarkPolicy::Multi);
        opts.dry_run = true;

        let report = sync_source(&fake, &store, &opts, at(0)).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.accepted, 1);
        assert_eq!(store.stats().unwrap().rows, 0);
    }
}
