//! Stable identity of a (track, artist) pair.

use sha2::{Digest, Sha256};

/// Hex characters kept from each field digest.
const FIELD_DIGEST_LEN: usize = 16;

/// Trims surrounding whitespace and lower-cases.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn field_digest(value: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(normalize(value).as_bytes()));
    digest[..FIELD_DIGEST_LEN].to_string()
}

/// Group key of a play. Only track and artist take part.
pub fn group_key(track: &str, artist: &str) -> String {
    format!("{}{}", field_digest(track), field_digest(artist))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert_eq!(group_key("  Song ", "Artist"), group_key("song", "ARTIST"));
    }

    #[test]
    fn test_distinguishes_track_from_artist() {
        assert_ne!(group_key("a", "b"), group_key("b", "a"));
        assert_ne!(group_key("Song", "Artist"), group_key("Song", "Other"));
    }

    #[test]
    fn test_is_stable() {
        let key = group_key("Song", "Artist");
        assert_eq!(key.len(), FIELD_DIGEST_LEN * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, group_key("Song", "Artist"));
    }

    #[test]
    fn test_inner_whitespace_is_kept() {
        assert_ne!(group_key("So ng", "Artist"), group_key("Song", "Artist"));
    }
}
