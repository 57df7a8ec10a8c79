//! Source backfill for rows stored before sources were recorded.

use crate::play_event::{PlayEvent, Source, StoredPlay};
use chrono::{DateTime, TimeZone, Utc};

/// Plays before this instant with no other evidence came from Last.fm imports.
pub fn default_cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0)
        .single()
        .expect("Default attribution cutoff is a valid date")
}

/// Guesses the source of a row that has none.
///
/// A Spotify id of more than one character wins; shorter ids are
/// placeholders. Otherwise plays before `cutoff` are Last.fm history and
/// anything later is unknown.
pub fn infer_source(play: &StoredPlay, cutoff: DateTime<Utc>) -> Source {
    if play.ids.spotify_id.chars().count() > 1 {
        Source::Spotify
    } else if play.timestamp < cutoff {
        Source::Lastfm
    } else {
        Source::Unknown
    }
}

/// Converts a stored row, keeping its source when it has one.
pub fn attribute(play: StoredPlay, cutoff: DateTime<Utc>) -> PlayEvent {
    let source = match play.source {
        Some(source) => source,
        None => infer_source(&play, cutoff),
    };
    play.into_play(source)
}
