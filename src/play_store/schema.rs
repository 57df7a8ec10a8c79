//! SQLite schema definitions for the raw and enriched play databases.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::Connection;

/// Raw log before ingestion time was tracked.
const PLAYS_TABLE_V0: Table = Table {
    name: "plays",
    columns: &[
        sqlite_column!("insert_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("track", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("timestamp_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer),
        // NULL on rows imported from before sources were recorded
        sqlite_column!("source", &SqlType::Text),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("youtube_id", &SqlType::Text),
        sqlite_column!("youtube_category_id", &SqlType::Text),
        sqlite_column!("soundcloud_id", &SqlType::Text),
        sqlite_column!("soundcloud_permalink", &SqlType::Text),
        sqlite_column!("shazam_id", &SqlType::Text),
        sqlite_column!("shazam_permalink", &SqlType::Text),
        sqlite_column!("album_cover", &SqlType::Text),
    ],
    indices: &[
        ("idx_plays_source_timestamp", "source, timestamp_ms"),
        ("idx_plays_timestamp", "timestamp_ms"),
    ],
};

/// V1: adds `created_at_ms`. NULL for rows written by V0.
pub const PLAYS_TABLE: Table = Table {
    name: "plays",
    columns: &[
        sqlite_column!("insert_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("track", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("timestamp_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("source", &SqlType::Text),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("youtube_id", &SqlType::Text),
        sqlite_column!("youtube_category_id", &SqlType::Text),
        sqlite_column!("soundcloud_id", &SqlType::Text),
        sqlite_column!("soundcloud_permalink", &SqlType::Text),
        sqlite_column!("shazam_id", &SqlType::Text),
        sqlite_column!("shazam_permalink", &SqlType::Text),
        sqlite_column!("album_cover", &SqlType::Text),
        sqlite_column!("created_at_ms", &SqlType::Integer),
    ],
    indices: &[
        ("idx_plays_source_timestamp", "source, timestamp_ms"),
        ("idx_plays_timestamp", "timestamp_ms"),
    ],
};

fn add_created_at(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE plays ADD COLUMN created_at_ms INTEGER", [])?;
    Ok(())
}

pub const RAW_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[PLAYS_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[PLAYS_TABLE],
        migration: Some(add_created_at),
    },
];

/// Enriched view. Rebuilt from scratch on every publish.
pub const ENRICHED_PLAYS_TABLE: Table = Table {
    name: "enriched_plays",
    columns: &[
        sqlite_column!("row_index", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("group_key", &SqlType::Text, non_null = true),
        sqlite_column!("track", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("album", &SqlType::Text, non_null = true),
        sqlite_column!("timestamp_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!("spotify_id", &SqlType::Text, non_null = true),
        sqlite_column!("youtube_id", &SqlType::Text, non_null = true),
        sqlite_column!("youtube_category_id", &SqlType::Text, non_null = true),
        sqlite_column!("soundcloud_id", &SqlType::Text, non_null = true),
        sqlite_column!("soundcloud_permalink", &SqlType::Text, non_null = true),
        sqlite_column!("shazam_id", &SqlType::Text, non_null = true),
        sqlite_column!("shazam_permalink", &SqlType::Text, non_null = true),
        sqlite_column!("album_cover", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_enriched_group_key", "group_key"),
        ("idx_enriched_timestamp", "timestamp_ms"),
    ],
};

/// Name of the staging table loaded before the swap.
pub const ENRICHED_STAGING_TABLE: &str = "enriched_plays_next";

pub const ENRICHED_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ENRICHED_PLAYS_TABLE],
    migration: None,
}];
