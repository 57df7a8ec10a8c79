//! Newline-delimited JSON dumps of the raw log.

use crate::play_event::StoredPlay;
use crate::play_store::{InsertOutcome, PlayFilter, RawPlayStore};
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use tracing::info;

/// Writes every raw row as one JSON object per line, newest first.
pub fn export_ndjson(store: &dyn RawPlayStore, mut writer: impl Write) -> Result<usize> {
    let rows = store.query_all(&PlayFilter::default())?;
    for row in &rows {
        serde_json::to_writer(&mut writer, row)
            .with_context(|| format!("Failed to serialize row {}", row.insert_id))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!("Exported {} rows", rows.len());
    Ok(rows.len())
}

/// Restores rows written by [`export_ndjson`], `chunk_size` rows per store call.
///
/// Rows whose insert id is already present are left alone. With `dry_run`
/// the file is still fully parsed but nothing is written.
pub fn import_ndjson(
    store: &dyn RawPlayStore,
    reader: impl BufRead,
    chunk_size: usize,
    dry_run: bool,
) -> Result<InsertOutcome> {
    let chunk_size = chunk_size.max(1);
    let mut outcome = InsertOutcome::default();
    let mut chunk: Vec<StoredPlay> = Vec::with_capacity(chunk_size);
    let mut parsed = 0;
    let mut submitted = 0;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: StoredPlay = serde_json::from_str(&line)
            .with_context(|| format!("Invalid row on line {}", line_number + 1))?;
        parsed += 1;
        chunk.push(row);
        if chunk.len() == chunk_size {
            if !dry_run {
                import_chunk(store, &chunk, submitted, &mut outcome)?;
            }
            submitted += chunk.len();
            chunk.clear();
        }
    }
    if !chunk.is_empty() && !dry_run {
        import_chunk(store, &chunk, submitted, &mut outcome)?;
    }

    if dry_run {
        info!("Dry run: parsed {} rows, nothing imported", parsed);
    } else {
        info!(
            "Imported {} rows ({} already present, {} rejected)",
            outcome.inserted,
            outcome.deduplicated,
            outcome.rejected.len()
        );
    }
    Ok(outcome)
}

/// Imports one chunk, shifting rejected indices by `offset` so they count
/// rows from the start of the file.
fn import_chunk(
    store: &dyn RawPlayStore,
    chunk: &[StoredPlay],
    offset: usize,
    outcome: &mut InsertOutcome,
) -> Result<()> {
    let mut chunk_outcome = store.import(chunk)?;
    for row_error in &mut chunk_outcome.rejected {
        row_error.index += offset;
    }
    outcome.merge(chunk_outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::insert_id;
    use crate::play_event::{PlayEvent, Source};
    use crate::play_store::SqliteRawPlayStore;
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn make_store(dir: &TempDir, name: &str) -> SqliteRawPlayStore {
        SqliteRawPlayStore::new(dir.path().join(name)).unwrap()
    }

    fn seed(store: &SqliteRawPlayStore) {
        let plays = (0..3)
            .map(|i| {
                PlayEvent::new(
                    Source::Spotify,
                    format!("Song {}", i),
                    "Artist",
                    Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap(),
                )
            })
            .collect::<Vec<_>>();
        let ids = plays.iter().map(insert_id).collect::<Vec<_>>();
        store.batch_insert(&plays, &ids).unwrap();
    }

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let dir = TempDir::new().unwrap();
        let original = make_store(&dir, "a.db");
        seed(&original);

        let mut dump = Vec::new();
        assert_eq!(export_ndjson(&original, &mut dump).unwrap(), 3);
        assert_eq!(dump.iter().filter(|b| **b == b'\n').count(), 3);

        let restored = make_store(&dir, "b.db");
        let outcome = import_ndjson(&restored, Cursor::new(&dump), 2, false).unwrap();
        assert_eq!(outcome.inserted, 3);

        assert_eq!(
            restored.query_all(&PlayFilter::default()).unwrap(),
            original.query_all(&PlayFilter::default()).unwrap()
        );

        let again = import_ndjson(&restored, Cursor::new(&dump), 2, false).unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.deduplicated, 3);
    }

    #[test]
    fn test_legacy_row_without_source() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, "plays.db");
        let line = r#"{"insert_id":"legacy-1","source":null,"track":"Old","artist":"Band","album":"","timestamp":"2012-03-04T05:06:07Z","duration_ms":0,"album_cover":""}"#;

        let outcome = import_ndjson(&store, Cursor::new(line), 10, false).unwrap();
        assert_eq!(outcome.inserted, 1);

        let rows = store.query_all(&PlayFilter::default()).unwrap();
        assert_eq!(rows[0].insert_id, "legacy-1");
        assert_eq!(rows[0].source, None);
    }

    #[test]
    fn test_rejected_rows_are_numbered_from_start_of_file() {
        let dir = TempDir::new().unwrap();
        let source = make_store(&dir, "a.db");
        seed(&source);
        let mut dump = Vec::new();
        export_ndjson(&source, &mut dump).unwrap();
        dump.extend_from_slice(
            br#"{"insert_id":"blank-track","source":"lastfm","track":"","artist":"Band","album":"","timestamp":"2012-03-04T05:06:07Z","duration_ms":0,"album_cover":""}"#,
        );

        let target = make_store(&dir, "b.db");
        let outcome = import_ndjson(&target, Cursor::new(&dump), 2, false).unwrap();
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].index, 3);
        assert_eq!(outcome.rejected[0].insert_id, "blank-track");
    }

    #[test]
    fn test_dry_run_and_bad_lines() {
        let dir = TempDir::new().unwrap();
        let source = make_store(&dir, "a.db");
        seed(&source);
        let mut dump = Vec::new();
        export_ndjson(&source, &mut dump).unwrap();

        let target = make_store(&dir, "b.db");
        import_ndjson(&target, Cursor::new(&dump), 10, true).unwrap();
        assert!(target.query_all(&PlayFilter::default()).unwrap().is_empty());

        let err = import_ndjson(&target, Cursor::new("\n{not json}\n"), 10, false).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
