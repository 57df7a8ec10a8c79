//! Free-text "now playing" submissions.

use crate::play_event::{PlayEvent, Source};
use chrono::{DateTime, Utc};
use thiserror::Error;

const SEPARATOR: &str = " by ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Message is empty")]
    Empty,
}

/// Splits "<track> by <artist>" into `(track, artist)`.
///
/// The last " by " separates the artist, so titles that contain the word keep
/// it. A message without any separator is used for both fields.
pub fn parse_message(message: &str) -> Result<(String, String), MessageError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(MessageError::Empty);
    }
    match message.rsplit_once(SEPARATOR) {
        Some((track, artist)) if !track.trim().is_empty() && !artist.trim().is_empty() => {
            Ok((track.trim().to_string(), artist.trim().to_string()))
        }
        _ => Ok((message.to_string(), message.to_string())),
    }
}

/// A `now_playing` play received at `received_at`.
pub fn now_playing_event(message: &str, received_at: DateTime<Utc>) -> Result<PlayEvent, MessageError> {
    let (track, artist) = parse_message(message)?;
    Ok(PlayEvent::new(Source::NowPlaying, track, artist, received_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_message() {
        assert_eq!(
            parse_message("Song by Artist"),
            Ok(("Song".to_string(), "Artist".to_string()))
        );
    }

    #[test]
    fn test_last_separator_wins() {
        assert_eq!(
            parse_message("Stand by Me by Ben E. King"),
            Ok(("Stand by Me".to_string(), "Ben E. King".to_string()))
        );
        assert_eq!(
            parse_message("A by B by C by D"),
            Ok(("A by B by C".to_string(), "D".to_string()))
        );
    }

    #[test]
    fn test_no_separator_uses_whole_message() {
        assert_eq!(
            parse_message("  Untitled  "),
            Ok(("Untitled".to_string(), "Untitled".to_string()))
        );
    }

    #[test]
    fn test_empty_message_is_rejected() {
        assert_eq!(parse_message("   "), Err(MessageError::Empty));
    }

    #[test]
    fn test_now_playing_event() {
        let now = Utc::now();
        let play = now_playing_event("Song by Artist", now).unwrap();
        assert_eq!(play.source, Source::NowPlaying);
        assert_eq!(play.timestamp, now);
        assert_eq!(play.created_at, now);
    }
}
