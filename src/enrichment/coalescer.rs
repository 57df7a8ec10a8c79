//! Metadata coalescing across plays of the same track.
//!
//! Plays are grouped by [`group_key`]. Each group gets a representative value
//! per field, the most common non-blank value; ties go to the smallest value
//! in byte order. Duration is represented by the truncated mean of the
//! nonzero durations. Every play then has its blank fields filled in from the
//! representative, and its track and artist replaced by the representative
//! spelling. Only empty fields count as missing on the play itself; blank
//! values are ignored when voting. No play is ever dropped or merged.

use crate::group_key::group_key;
use crate::play_event::{EnrichedEvent, PlayEvent};
use std::collections::BTreeMap;

/// Text fields that are only filled in when blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImputedField {
    Album,
    AlbumCover,
    SpotifyId,
    SoundcloudId,
    SoundcloudPermalink,
    ShazamId,
    ShazamPermalink,
    YoutubeId,
    YoutubeCategoryId,
}

impl ImputedField {
    const ALL: [ImputedField; 9] = [
        ImputedField::Album,
        ImputedField::AlbumCover,
        ImputedField::SpotifyId,
        ImputedField::SoundcloudId,
        ImputedField::SoundcloudPermalink,
        ImputedField::ShazamId,
        ImputedField::ShazamPermalink,
        ImputedField::YoutubeId,
        ImputedField::YoutubeCategoryId,
    ];

    fn get(self, play: &PlayEvent) -> &str {
        match self {
            ImputedField::Album => &play.album,
            ImputedField::AlbumCover => &play.album_cover,
            ImputedField::SpotifyId => &play.ids.spotify_id,
            ImputedField::SoundcloudId => &play.ids.soundcloud_id,
            ImputedField::SoundcloudPermalink => &play.ids.soundcloud_permalink,
            ImputedField::ShazamId => &play.ids.shazam_id,
            ImputedField::ShazamPermalink => &play.ids.shazam_permalink,
            ImputedField::YoutubeId => &play.ids.youtube_id,
            ImputedField::YoutubeCategoryId => &play.ids.youtube_category_id,
        }
    }

    fn get_mut(self, play: &mut PlayEvent) -> &mut String {
        match self {
            ImputedField::Album => &mut play.album,
            ImputedField::AlbumCover => &mut play.album_cover,
            ImputedField::SpotifyId => &mut play.ids.spotify_id,
            ImputedField::SoundcloudId => &mut play.ids.soundcloud_id,
            ImputedField::SoundcloudPermalink => &mut play.ids.soundcloud_permalink,
            ImputedField::ShazamId => &mut play.ids.shazam_id,
            ImputedField::ShazamPermalink => &mut play.ids.shazam_permalink,
            ImputedField::YoutubeId => &mut play.ids.youtube_id,
            ImputedField::YoutubeCategoryId => &mut play.ids.youtube_category_id,
        }
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Most frequent non-blank value, smallest value on ties. Empty if all blank.
pub fn plurality<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        if !is_blank(value) {
            *counts.entry(value).or_default() += 1;
        }
    }
    let mut best: Option<(&str, usize)> = None;
    // Ascending order: only a strictly higher count displaces the current best
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string()).unwrap_or_default()
}

/// Truncated mean of the nonzero durations, 0 if there are none.
pub fn mean_nonzero_duration(durations: impl IntoIterator<Item = u64>) -> u64 {
    let (sum, count) = durations
        .into_iter()
        .filter(|d| *d > 0)
        .fold((0u128, 0u128), |(sum, count), d| (sum + d as u128, count + 1));
    if count == 0 {
        0
    } else {
        (sum / count) as u64
    }
}

/// Representative values of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Representative {
    pub track: String,
    pub artist: String,
    pub duration_ms: u64,
    imputed: Vec<(ImputedField, String)>,
}

impl Representative {
    pub fn of(group: &[&PlayEvent]) -> Self {
        Self {
            track: plurality(group.iter().map(|p| p.track.as_str())),
            artist: plurality(group.iter().map(|p| p.artist.as_str())),
            duration_ms: mean_nonzero_duration(group.iter().map(|p| p.duration_ms)),
            imputed: ImputedField::ALL
                .iter()
                .map(|field| (*field, plurality(group.iter().map(|p| field.get(p)))))
                .collect(),
        }
    }

    /// Normalizes track and artist, fills empty fields of `play`.
    pub fn apply(&self, play: &mut PlayEvent) {
        if !is_blank(&self.track) {
            play.track.clone_from(&self.track);
        }
        if !is_blank(&self.artist) {
            play.artist.clone_from(&self.artist);
        }
        if play.duration_ms == 0 {
            play.duration_ms = self.duration_ms;
        }
        for (field, value) in &self.imputed {
            let current = field.get_mut(play);
            if current.is_empty() && !is_blank(value) {
                current.clone_from(value);
            }
        }
    }
}

/// Coalesces `rows` into enriched rows, one per input row, in input order.
pub fn coalesce(rows: Vec<PlayEvent>) -> Vec<EnrichedEvent> {
    let keys = rows
        .iter()
        .map(|row| group_key(&row.track, &row.artist))
        .collect::<Vec<_>>();

    let mut groups: BTreeMap<&str, Vec<&PlayEvent>> = BTreeMap::new();
    for (key, row) in keys.iter().zip(&rows) {
        groups.entry(key.as_str()).or_default().push(row);
    }
    let representatives = groups
        .into_iter()
        .map(|(key, members)| (key.to_string(), Representative::of(&members)))
        .collect::<BTreeMap<_, _>>();

    rows.into_iter()
        .zip(keys)
        .map(|(mut play, key)| {
            if let Some(representative) = representatives.get(&key) {
                representative.apply(&mut play);
            }
            EnrichedEvent {
                group_key: key,
                play,
            }
        })
        .collect()
}

/// Number of distinct groups among `rows`.
pub fn count_groups(rows: &[EnrichedEvent]) -> usize {
    rows.iter()
        .map(|r| r.group_key.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::play_event::Source;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn play(source: Source, track: &str, artist: &str, secs: i64) -> PlayEvent {
        PlayEvent::new(source, track, artist, at(secs))
    }

    fn sample_group() -> Vec<PlayEvent> {
        let mut a = play(Source::Spotify, "Song", "Artist", 0);
        a.album = "Album".to_string();
        a.ids.spotify_id = "sp1".to_string();
        a.album_cover = "https://img/spotify.jpg".to_string();
        a.duration_ms = 200_000;

        let mut b = play(Source::Lastfm, "song", "artist", 10);
        b.album = "Album".to_string();

        let mut c = play(Source::Youtube, "SONG ", "Artist", 20);
        c.ids.youtube_id = "yt1".to_string();
        c.ids.youtube_category_id = "10".to_string();
        c.album_cover = "https://img/youtube.jpg".to_string();
        c.duration_ms = 300_000;

        let d = play(Source::NowPlaying, "Song", "Artist", 30);

        vec![a, b, c, d]
    }

    #[test]
    fn test_plurality_ignores_blanks_and_breaks_ties() {
        assert_eq!(plurality(["b", "", "a", "b", " "]), "b");
        assert_eq!(plurality(["b", "a"]), "a");
        assert_eq!(plurality(["", "  "]), "");
        assert_eq!(plurality(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_duration_imputation() {
        let durations = [0, 200_000, 0, 300_000];
        let rows = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mut p = play(Source::Spotify, "Song", "Artist", i as i64);
                p.duration_ms = *d;
                p
            })
            .collect::<Vec<_>>();

        let enriched = coalesce(rows);
        let result = enriched
            .iter()
            .map(|e| e.play.duration_ms)
            .collect::<Vec<_>>();
        assert_eq!(result, vec![250_000, 200_000, 250_000, 300_000]);
    }

    #[test]
    fn test_mean_is_truncated() {
        assert_eq!(mean_nonzero_duration([1, 2]), 1);
        assert_eq!(mean_nonzero_duration([0, 0]), 0);
        assert_eq!(mean_nonzero_duration([u64::MAX, u64::MAX]), u64::MAX);
    }

    #[test]
    fn test_fills_only_blank_fields() {
        let input = sample_group();
        let enriched = coalesce(input.clone());
        assert_eq!(enriched.len(), input.len());

        for (before, after) in input.iter().zip(&enriched) {
            let after = &after.play;
            for field in ImputedField::ALL {
                if !field.get(before).is_empty() {
                    assert_eq!(field.get(before), field.get(after));
                }
            }
            if before.duration_ms != 0 {
                assert_eq!(before.duration_ms, after.duration_ms);
            }
            assert_eq!(before.timestamp, after.timestamp);
            assert_eq!(before.source, after.source);
        }

        // Present artwork is never replaced by the group's choice
        assert_eq!(enriched[2].play.album_cover, "https://img/youtube.jpg");
        // Blank fields are filled
        assert_eq!(enriched[1].play.ids.spotify_id, "sp1");
        assert_eq!(enriched[3].play.ids.youtube_id, "yt1");
        assert_eq!(enriched[3].play.album, "Album");
        assert_eq!(enriched[3].play.duration_ms, 250_000);
    }

    #[test]
    fn test_whitespace_value_is_kept() {
        let mut a = play(Source::Spotify, "Song", "Artist", 0);
        a.album = "Album".to_string();
        let mut b = play(Source::Lastfm, "Song", "Artist", 10);
        b.album = " ".to_string();

        let enriched = coalesce(vec![a, b]);
        assert_eq!(enriched[0].play.album, "Album");
        assert_eq!(enriched[1].play.album, " ");
    }

    #[test]
    fn test_track_and_artist_are_normalized() {
        let enriched = coalesce(sample_group());
        for row in &enriched {
            assert_eq!(row.play.track, "Song");
            assert_eq!(row.play.artist, "Artist");
        }
        assert_eq!(count_groups(&enriched), 1);
    }

    #[test]
    fn test_deterministic_under_reordering() {
        let input = sample_group();
        let mut reversed = input.clone();
        reversed.reverse();

        let forward = coalesce(input);
        let mut backward = coalesce(reversed);
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_groups_do_not_leak() {
        let mut a = play(Source::Spotify, "One", "Artist", 0);
        a.album = "First".to_string();
        let b = play(Source::Spotify, "Two", "Artist", 1);

        let enriched = coalesce(vec![a, b]);
        assert_eq!(enriched[1].play.album, "");
        assert_eq!(count_groups(&enriched), 2);
    }

    #[test]
    fn test_representative_album() {
        let group = sample_group();
        let refs = group.iter().collect::<Vec<_>>();
        let representative = Representative::of(&refs);
        assert_eq!(representative.track, "Song");
        assert_eq!(representative.duration_ms, 250_000);
        assert!(representative
            .imputed
            .contains(&(ImputedField::Album, "Album".to_string())));
        assert!(representative.imputed.contains(&(
            ImputedField::AlbumCover,
            "https://img/spotify.jpg".to_string()
        )));
    }
}
