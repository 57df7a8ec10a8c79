//! SQLite-backed raw play log.

use super::codec::{
    column, duration_from_sql, millis_to_datetime, source_from_sql, text_or_empty,
};
use super::models::{DecodeError, InsertOutcome, PlayFilter, PlayStoreStats, RowError};
use super::schema::{PLAYS_TABLE, RAW_VERSIONED_SCHEMAS};
use super::trait_def::RawPlayStore;
use crate::play_event::{PlayEvent, Source, SourceIds, StoredPlay};
use crate::sqlite_persistence::open_versioned;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// SQLite-backed raw play log.
#[derive(Clone)]
pub struct SqliteRawPlayStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

impl SqliteRawPlayStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open plays database {:?}", db_path_ref))?;

        open_versioned(&mut write_conn, RAW_VERSIONED_SCHEMAS, "plays")?;

        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on plays write connection")?;

        let read_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open plays database for reading")?;

        read_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on plays read connection")?;

        let stats = Self::count_rows(&read_conn)?;
        info!(
            "Plays store ready: {} rows, {} without source",
            stats.rows, stats.rows_without_source
        );

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }

    fn count_rows(conn: &Connection) -> Result<PlayStoreStats> {
        let rows: usize = conn.query_row("SELECT COUNT(*) FROM plays", [], |r| r.get(0))?;
        let rows_without_source: usize = conn.query_row(
            "SELECT COUNT(*) FROM plays WHERE source IS NULL",
            [],
            |r| r.get(0),
        )?;
        Ok(PlayStoreStats {
            rows,
            rows_without_source,
        })
    }

    fn write_rows(&self, rows: &[StoredPlay]) -> Result<InsertOutcome> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR IGNORE INTO plays ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                PLAYS_TABLE.column_list()
            ))?;
            for (index, row) in rows.iter().enumerate() {
                let (timestamp_ms, duration_ms) = match check_row(row) {
                    Ok(encoded) => encoded,
                    Err(reason) => {
                        outcome.rejected.push(RowError {
                            index,
                            insert_id: row.insert_id.clone(),
                            reason,
                        });
                        continue;
                    }
                };
                let changed = stmt
                    .execute(params![
                        row.insert_id,
                        row.track,
                        row.artist,
                        row.album,
                        timestamp_ms,
                        duration_ms,
                        row.source.map(|s| s.as_str()),
                        row.ids.spotify_id,
                        row.ids.youtube_id,
                        row.ids.youtube_category_id,
                        row.ids.soundcloud_id,
                        row.ids.soundcloud_permalink,
                        row.ids.shazam_id,
                        row.ids.shazam_permalink,
                        row.album_cover,
                        row.created_at.map(|t| t.timestamp_millis()),
                    ])
                    .with_context(|| format!("Failed to insert play {}", row.insert_id))?;
                if changed == 0 {
                    outcome.deduplicated += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit().context("Failed to commit plays batch")?;
        Ok(outcome)
    }
}

/// Encodes the columns that can fail, or explains why the row is refused.
fn check_row(row: &StoredPlay) -> std::result::Result<(i64, i64), String> {
    if row.track.trim().is_empty() {
        return Err("track is blank".to_string());
    }
    if row.artist.trim().is_empty() {
        return Err("artist is blank".to_string());
    }
    let timestamp_ms = row.timestamp.timestamp_millis();
    if timestamp_ms < 0 {
        return Err(format!("timestamp {} is before the Unix epoch", row.timestamp));
    }
    let duration_ms = i64::try_from(row.duration_ms)
        .map_err(|_| format!("duration {} ms is out of range", row.duration_ms))?;
    Ok((timestamp_ms, duration_ms))
}

fn decode_play_row(row: &Row) -> std::result::Result<StoredPlay, DecodeError> {
    let insert_id: String = column(row, 0, "insert_id", "?")?;
    let id = insert_id.as_str();

    let timestamp_ms: i64 = column(row, 4, "timestamp_ms", id)?;
    let timestamp = millis_to_datetime(timestamp_ms, "timestamp_ms", id)?;
    let source = match column::<Option<String>>(row, 6, "source", id)? {
        Some(tag) if !tag.trim().is_empty() => Some(source_from_sql(&tag, id)?),
        _ => None,
    };
    let created_at = match column::<Option<i64>>(row, 15, "created_at_ms", id)? {
        Some(millis) => Some(millis_to_datetime(millis, "created_at_ms", id)?),
        None => None,
    };

    Ok(StoredPlay {
        track: column(row, 1, "track", id)?,
        artist: column(row, 2, "artist", id)?,
        album: text_or_empty(row, 3, "album", id)?,
        timestamp,
        created_at,
        duration_ms: duration_from_sql(column(row, 5, "duration_ms", id)?, id)?,
        source,
        ids: SourceIds {
            spotify_id: text_or_empty(row, 7, "spotify_id", id)?,
            youtube_id: text_or_empty(row, 8, "youtube_id", id)?,
            youtube_category_id: text_or_empty(row, 9, "youtube_category_id", id)?,
            soundcloud_id: text_or_empty(row, 10, "soundcloud_id", id)?,
            soundcloud_permalink: text_or_empty(row, 11, "soundcloud_permalink", id)?,
            shazam_id: text_or_empty(row, 12, "shazam_id", id)?,
            shazam_permalink: text_or_empty(row, 13, "shazam_permalink", id)?,
        },
        album_cover: text_or_empty(row, 14, "album_cover", id)?,
        insert_id,
    })
}

impl RawPlayStore for SqliteRawPlayStore {
    fn recent_timestamps(&self, source: Source, n: usize) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp_ms FROM plays WHERE source = ?1 ORDER BY timestamp_ms DESC LIMIT ?2",
        )?;
        let millis = stmt
            .query_map(params![source.as_str(), n as i64], |r| r.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read recent {} timestamps", source))?;

        let mut timestamps = Vec::with_capacity(millis.len());
        for value in millis {
            timestamps.push(millis_to_datetime(value, "timestamp_ms", source.as_str())?);
        }
        Ok(timestamps)
    }

    fn query_all(&self, filter: &PlayFilter) -> Result<Vec<StoredPlay>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(source) = filter.source {
            values.push(Value::Text(source.as_str().to_string()));
            clauses.push(format!("source = ?{}", values.len()));
        }
        if let Some(since) = filter.since {
            values.push(Value::Integer(since.timestamp_millis()));
            clauses.push(format!("timestamp_ms >= ?{}", values.len()));
        }
        if let Some(until) = filter.until {
            values.push(Value::Integer(until.timestamp_millis()));
            clauses.push(format!("timestamp_ms < ?{}", values.len()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM plays{} ORDER BY timestamp_ms DESC, insert_id ASC",
            PLAYS_TABLE.column_list(),
            where_sql
        ))?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut plays = Vec::new();
        while let Some(row) = rows.next().context("Failed to read plays")? {
            plays.push(decode_play_row(row)?);
        }
        Ok(plays)
    }

    fn batch_insert(&self, rows: &[PlayEvent], insert_ids: &[String]) -> Result<InsertOutcome> {
        if rows.len() != insert_ids.len() {
            bail!(
                "Batch insert got {} rows but {} insert ids",
                rows.len(),
                insert_ids.len()
            );
        }
        let stored = rows
            .iter()
            .zip(insert_ids)
            .map(|(play, id)| StoredPlay::from_play(id.clone(), play))
            .collect::<Vec<_>>();
        self.write_rows(&stored)
    }

    fn import(&self, rows: &[StoredPlay]) -> Result<InsertOutcome> {
        self.write_rows(rows)
    }

    fn stats(&self) -> Result<PlayStoreStats> {
        let conn = self.read_conn.lock().unwrap();
        Self::count_rows(&conn)
    }
}
