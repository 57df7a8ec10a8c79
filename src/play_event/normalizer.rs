//! Conversion of source-specific candidates into [`PlayEvent`]s.

use super::models::{PlayEvent, Source, SourceIds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// YouTube category ids that count as music listening.
pub const YOUTUBE_MUSIC_CATEGORIES: [&str; 2] = ["10", "24"];

/// A play as reported by a connector, before normalization.
///
/// Connectors fill whatever their API exposes; `external_id`, `permalink`
/// and `category_id` are mapped to the source-specific identifier fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCandidate {
    pub track: String,
    pub artist: String,
    /// Account name of the uploader, when the source has one.
    pub uploader: String,
    pub album: String,
    pub played_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub artwork_url: String,
    pub external_id: String,
    pub permalink: String,
    pub category_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Candidate has no track title")]
    MissingTrack,

    #[error("Candidate has no artist")]
    MissingArtist,

    #[error("Candidate has no play time")]
    MissingTimestamp,

    #[error("YouTube video in category '{0}' is not music")]
    NotMusic(String),

    #[error("Candidates cannot be ingested for source {0}")]
    UnsupportedSource(Source),
}

/// Builds the canonical event for `candidate` observed on `source`.
///
/// `ingested_at` becomes the row's `created_at`.
pub fn normalize(
    source: Source,
    candidate: &RawCandidate,
    ingested_at: DateTime<Utc>,
) -> Result<PlayEvent, NormalizeError> {
    let mut track = candidate.track.trim().to_string();
    let mut artist = candidate.artist.trim().to_string();
    let uploader = candidate.uploader.trim();
    let external_id = candidate.external_id.trim().to_string();
    let permalink = candidate.permalink.trim().to_string();

    let mut ids = SourceIds::default();
    match source {
        Source::Spotify => {
            ids.spotify_id = external_id;
        }
        Source::Youtube => {
            let category = candidate.category_id.trim();
            if !YOUTUBE_MUSIC_CATEGORIES.contains(&category) {
                return Err(NormalizeError::NotMusic(category.to_string()));
            }
            ids.youtube_id = external_id;
            ids.youtube_category_id = category.to_string();
        }
        Source::Soundcloud => {
            if artist.is_empty() {
                artist = uploader.to_string();
            }
            track = compress_title(&track, uploader);
            ids.soundcloud_id = external_id;
            ids.soundcloud_permalink = permalink;
        }
        Source::Shazam => {
            ids.shazam_id = external_id;
            ids.shazam_permalink = permalink;
        }
        Source::Lastfm | Source::NowPlaying => {}
        Source::Unknown => return Err(NormalizeError::UnsupportedSource(source)),
    }

    if track.is_empty() {
        return Err(NormalizeError::MissingTrack);
    }
    if artist.is_empty() {
        return Err(NormalizeError::MissingArtist);
    }
    let timestamp = candidate.played_at.ok_or(NormalizeError::MissingTimestamp)?;

    Ok(PlayEvent {
        track,
        artist,
        album: candidate.album.trim().to_string(),
        timestamp,
        created_at: ingested_at,
        duration_ms: candidate.duration_ms,
        source,
        ids,
        album_cover: candidate.artwork_url.trim().to_string(),
    })
}

/// Drops a leading uploader name from a SoundCloud title.
///
/// Uploads are often titled "<uploader> - <track>". The prefix and any
/// punctuation after it are removed; if nothing remains the title is kept.
fn compress_title(title: &str, uploader: &str) -> String {
    if uploader.is_empty() {
        return title.to_string();
    }
    let Some(rest) = title.strip_prefix(uploader) else {
        return title.to_string();
    };
    let rest = rest.trim_start_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_'));
    if rest.is_empty() {
        title.to_string()
    } else {
        rest.to_string()
    }
}
