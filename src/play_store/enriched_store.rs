//! SQLite-backed enriched view.

use super::codec::{column, duration_from_sql, millis_to_datetime, source_from_sql};
use super::models::DecodeError;
use super::schema::{ENRICHED_PLAYS_TABLE, ENRICHED_STAGING_TABLE, ENRICHED_VERSIONED_SCHEMAS};
use super::trait_def::EnrichedPlayStore;
use crate::play_event::{EnrichedEvent, PlayEvent, SourceIds};
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// SQLite-backed enriched view.
#[derive(Clone)]
pub struct SqliteEnrichedPlayStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

impl SqliteEnrichedPlayStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open enriched database {:?}", db_path_ref))?;

        // A crash between staging and swap leaves the staging table behind
        write_conn
            .execute(&format!("DROP TABLE IF EXISTS {}", ENRICHED_STAGING_TABLE), [])
            .context("Failed to drop stale enriched staging table")?;

        open_versioned(&mut write_conn, ENRICHED_VERSIONED_SCHEMAS, "enriched")?;

        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on enriched write connection")?;

        let read_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open enriched database for reading")?;

        read_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on enriched read connection")?;

        let rows: usize =
            read_conn.query_row("SELECT COUNT(*) FROM enriched_plays", [], |r| r.get(0))?;
        info!("Enriched store ready: {} rows", rows);

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }
}

fn decode_enriched_row(row: &Row) -> std::result::Result<EnrichedEvent, DecodeError> {
    let row_index: i64 = column(row, 0, "row_index", "?")?;
    let id = format!("#{}", row_index);
    let id = id.as_str();

    let tag: String = column(row, 8, "source", id)?;

    Ok(EnrichedEvent {
        group_key: column(row, 1, "group_key", id)?,
        play: PlayEvent {
            track: column(row, 2, "track", id)?,
            artist: column(row, 3, "artist", id)?,
            album: column(row, 4, "album", id)?,
            timestamp: millis_to_datetime(column(row, 5, "timestamp_ms", id)?, "timestamp_ms", id)?,
            created_at: millis_to_datetime(
                column(row, 6, "created_at_ms", id)?,
                "created_at_ms",
                id,
            )?,
            duration_ms: duration_from_sql(column(row, 7, "duration_ms", id)?, id)?,
            source: source_from_sql(&tag, id)?,
            ids: SourceIds {
                spotify_id: column(row, 9, "spotify_id", id)?,
                youtube_id: column(row, 10, "youtube_id", id)?,
                youtube_category_id: column(row, 11, "youtube_category_id", id)?,
                soundcloud_id: column(row, 12, "soundcloud_id", id)?,
                soundcloud_permalink: column(row, 13, "soundcloud_permalink", id)?,
                shazam_id: column(row, 14, "shazam_id", id)?,
                shazam_permalink: column(row, 15, "shazam_permalink", id)?,
            },
            album_cover: column(row, 16, "album_cover", id)?,
        },
    })
}

impl EnrichedPlayStore for SqliteEnrichedPlayStore {
    fn atomic_replace(&self, rows: &[EnrichedEvent]) -> Result<()> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", ENRICHED_STAGING_TABLE), [])?;
        ENRICHED_PLAYS_TABLE.create_named(&tx, ENRICHED_STAGING_TABLE)?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                ENRICHED_STAGING_TABLE,
                ENRICHED_PLAYS_TABLE.column_list()
            ))?;
            for (index, row) in rows.iter().enumerate() {
                let play = &row.play;
                let duration_ms = i64::try_from(play.duration_ms).with_context(|| {
                    format!(
                        "Enriched row {} has duration {} ms out of range",
                        index, play.duration_ms
                    )
                })?;
                stmt.execute(params![
                    index as i64,
                    row.group_key,
                    play.track,
                    play.artist,
                    play.album,
                    play.timestamp.timestamp_millis(),
                    play.created_at.timestamp_millis(),
                    duration_ms,
                    play.source.as_str(),
                    play.ids.spotify_id,
                    play.ids.youtube_id,
                    play.ids.youtube_category_id,
                    play.ids.soundcloud_id,
                    play.ids.soundcloud_permalink,
                    play.ids.shazam_id,
                    play.ids.shazam_permalink,
                    play.album_cover,
                ])
                .with_context(|| format!("Failed to stage enriched row {}", index))?;
            }
        }
        debug!("Staged {} enriched rows, swapping tables", rows.len());

        tx.execute(&format!("DROP TABLE {}", ENRICHED_PLAYS_TABLE.name), [])?;
        tx.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                ENRICHED_STAGING_TABLE, ENRICHED_PLAYS_TABLE.name
            ),
            [],
        )?;
        ENRICHED_PLAYS_TABLE.create_indices(&tx)?;
        tx.commit().context("Failed to commit enriched table swap")?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<EnrichedEvent>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY row_index",
            ENRICHED_PLAYS_TABLE.column_list(),
            ENRICHED_PLAYS_TABLE.name
        ))?;
        let mut rows = stmt.query([])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().context("Failed to read enriched plays")? {
            events.push(decode_enriched_row(row)?);
        }
        Ok(events)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.read_conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM enriched_plays", [], |r| r.get(0))?;
        Ok(count)
    }
}
