//! Canonical play records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a play was observed.
///
/// Closed set; the stored text form is the snake_case tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Spotify,
    Lastfm,
    Youtube,
    Soundcloud,
    Shazam,
    NowPlaying,
    Unknown,
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::Spotify,
        Source::Lastfm,
        Source::Youtube,
        Source::Soundcloud,
        Source::Shazam,
        Source::NowPlaying,
        Source::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Spotify => "spotify",
            Source::Lastfm => "lastfm",
            Source::Youtube => "youtube",
            Source::Soundcloud => "soundcloud",
            Source::Shazam => "shazam",
            Source::NowPlaying => "now_playing",
            Source::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spotify" => Some(Source::Spotify),
            "lastfm" => Some(Source::Lastfm),
            "youtube" => Some(Source::Youtube),
            "soundcloud" => Some(Source::Soundcloud),
            "shazam" => Some(Source::Shazam),
            "now_playing" => Some(Source::NowPlaying),
            "unknown" => Some(Source::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-specific identifiers and permalinks. Empty string means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceIds {
    pub spotify_id: String,
    pub youtube_id: String,
    pub youtube_category_id: String,
    pub soundcloud_id: String,
    pub soundcloud_permalink: String,
    pub shazam_id: String,
    pub shazam_permalink: String,
}

/// A single play, as appended to the raw log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub track: String,
    /// May hold several comma-joined artists, kept verbatim.
    pub artist: String,
    pub album: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// 0 when unknown.
    pub duration_ms: u64,
    pub source: Source,
    #[serde(flatten)]
    pub ids: SourceIds,
    pub album_cover: String,
}

impl PlayEvent {
    /// A play with only the required fields set, `created_at` equal to `timestamp`.
    pub fn new(
        source: Source,
        track: impl Into<String>,
        artist: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            track: track.into(),
            artist: artist.into(),
            album: String::new(),
            timestamp,
            created_at: timestamp,
            duration_ms: 0,
            source,
            ids: SourceIds::default(),
            album_cover: String::new(),
        }
    }
}

/// A row read back from the raw log.
///
/// Rows written before source tracking existed have no `source`; every other
/// field mirrors [`PlayEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPlay {
    pub insert_id: String,
    pub source: Option<Source>,
    pub track: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(flatten)]
    pub ids: SourceIds,
    #[serde(default)]
    pub album_cover: String,
}

impl StoredPlay {
    pub fn from_play(insert_id: String, play: &PlayEvent) -> Self {
        Self {
            insert_id,
            source: Some(play.source),
            track: play.track.clone(),
            artist: play.artist.clone(),
            album: play.album.clone(),
            timestamp: play.timestamp,
            created_at: Some(play.created_at),
            duration_ms: play.duration_ms,
            ids: play.ids.clone(),
            album_cover: play.album_cover.clone(),
        }
    }

    /// Converts into a [`PlayEvent`] attributed to `source`.
    pub fn into_play(self, source: Source) -> PlayEvent {
        PlayEvent {
            track: self.track,
            artist: self.artist,
            album: self.album,
            timestamp: self.timestamp,
            created_at: self.created_at.unwrap_or(self.timestamp),
            duration_ms: self.duration_ms,
            source,
            ids: self.ids,
            album_cover: self.album_cover,
        }
    }
}

/// A play after coalescing, tagged with its group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub group_key: String,
    #[serde(flatten)]
    pub play: PlayEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_source_tags_round_trip() {
        for source in Source::ALL {
            assert_eq!(Source::parse(source.as_str()), Some(source));
        }
        assert_eq!(Source::parse(""), None);
        assert_eq!(Source::parse("Spotify"), None);
    }

    #[test]
    fn test_source_serializes_as_tag() {
        let json = serde_json::to_string(&Source::NowPlaying).unwrap();
        assert_eq!(json, "\"now_playing\"");
    }

    #[test]
    fn test_stored_play_defaults_created_at_to_timestamp() {
        let ts = Utc.with_ymd_and_hms(2016, 3, 1, 12, 0, 0).unwrap();
        let stored = StoredPlay {
            insert_id: "abc".to_string(),
            source: None,
            track: "Song".to_string(),
            artist: "Artist".to_string(),
            album: String::new(),
            timestamp: ts,
            created_at: None,
            duration_ms: 0,
            ids: SourceIds::default(),
            album_cover: String::new(),
        };

        let play = stored.into_play(Source::Lastfm);
        assert_eq!(play.created_at, ts);
        assert_eq!(play.source, Source::Lastfm);
    }

    #[test]
    fn test_stored_play_deserializes_legacy_json() {
        let json = r#"{
            "insert_id": "legacy-1",
            "source": null,
            "track": "Song",
            "artist": "Artist",
            "timestamp": "2015-06-01T10:00:00Z",
            "spotify_id": "x"
        }"#;
        let stored: StoredPlay = serde_json::from_str(json).unwrap();

        assert_eq!(stored.source, None);
        assert_eq!(stored.ids.spotify_id, "x");
        assert_eq!(stored.created_at, None);
        assert_eq!(stored.album, "");
    }
}
