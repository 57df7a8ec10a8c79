//! Test fixtures: temporary stores and candidate data

use super::constants::*;
use chrono::{DateTime, TimeZone, Utc};
use playlog::ingestion::{insert_id, SyncOptions, WatermarkPolicy};
use playlog::play_event::{PlayEvent, RawCandidate};
use playlog::play_store::{RawPlayStore, SqliteEnrichedPlayStore, SqliteRawPlayStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A raw and an enriched store living in one temporary directory.
pub struct TestStores {
    pub raw: Arc<SqliteRawPlayStore>,
    pub enriched: Arc<SqliteEnrichedPlayStore>,
    pub dir: TempDir,
}

impl TestStores {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let raw = Arc::new(
            SqliteRawPlayStore::new(dir.path().join("plays.db"))
                .expect("Failed to open raw store"),
        );
        let enriched = Arc::new(
            SqliteEnrichedPlayStore::new(dir.path().join("enriched.db"))
                .expect("Failed to open enriched store"),
        );
        Self { raw, enriched, dir }
    }

    pub fn raw_db_path(&self) -> PathBuf {
        self.dir.path().join("plays.db")
    }

    /// Writes `plays` straight to the raw log, bypassing the guard.
    pub fn insert(&self, plays: &[PlayEvent]) {
        let ids = plays.iter().map(insert_id).collect::<Vec<_>>();
        let outcome = self
            .raw
            .batch_insert(plays, &ids)
            .expect("Failed to insert fixture plays");
        assert!(outcome.rejected.is_empty(), "{:?}", outcome.rejected);
    }
}

/// Fixture time `secs` seconds after [`BASE_EPOCH_SECS`].
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(BASE_EPOCH_SECS + secs, 0).unwrap()
}

pub fn candidate(track: &str, artist: &str, secs: i64) -> RawCandidate {
    RawCandidate {
        track: track.to_string(),
        artist: artist.to_string(),
        played_at: Some(at(secs)),
        ..Default::default()
    }
}

/// Writes `candidates` as the JSON file a source export would produce.
pub fn write_candidates(dir: &TempDir, name: &str, candidates: &[RawCandidate]) -> PathBuf {
    let path = dir.path().join(name);
    let content = serde_json::to_string(candidates).expect("Failed to serialize candidates");
    std::fs::write(&path, content).expect("Failed to write candidates file");
    path
}

pub fn sync_options(policy: WatermarkPolicy) -> SyncOptions {
    SyncOptions {
        policy,
        watermark_depth: 100,
        chunk_size: TEST_CHUNK_SIZE,
        dry_run: false,
    }
}
