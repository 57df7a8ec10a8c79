//! Collapses repeated now-playing submissions of the same play.

use crate::group_key::group_key;
use crate::play_event::{PlayEvent, Source};

/// Keeps the first now-playing row of each streak of the same track.
///
/// `rows` must be ordered by timestamp, newest first. Rows of other sources
/// are always kept and end the current streak.
pub fn collapse_now_playing(rows: Vec<PlayEvent>) -> Vec<PlayEvent> {
    let mut last_hash = String::new();
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        match row.source {
            Source::NowPlaying => {
                let hash = group_key(&row.track, &row.artist);
                if hash != last_hash {
                    kept.push(row);
                }
                last_hash = hash;
            }
            Source::Spotify
            | Source::Lastfm
            | Source::Youtube
            | Source::Soundcloud
            | Source::Shazam
            | Source::Unknown => {
                last_hash.clear();
                kept.push(row);
            }
        }
    }
    kept
}
