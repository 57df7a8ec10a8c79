//! Where candidate plays come from.

use crate::play_event::{PlayEvent, RawCandidate, Source};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// A connector reporting recent plays of one source.
pub trait CandidateSource: Send + Sync {
    fn source(&self) -> Source;

    /// Recently played items, in whatever order the source reports them.
    fn fetch(&self) -> Result<Vec<RawCandidate>>;

    /// Whether [`Self::fetch`] returns the newest play first.
    fn reverse_chronological(&self) -> bool {
        false
    }

    /// Looks up metadata the listing does not carry (album, artwork, ...).
    ///
    /// Called on accepted plays, oldest first. A failure stops the run before
    /// that play, so the next run picks it up again.
    fn complete_metadata(&self, play: PlayEvent) -> Result<PlayEvent> {
        Ok(play)
    }
}

/// Candidates exported to a JSON array of [`RawCandidate`]s.
pub struct JsonFileCandidateSource {
    source: Source,
    path: PathBuf,
}

impl JsonFileCandidateSource {
    pub fn new(source: Source, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }
}

impl CandidateSource for JsonFileCandidateSource {
    fn source(&self) -> Source {
        self.source
    }

    fn fetch(&self) -> Result<Vec<RawCandidate>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read candidates file {:?}", self.path))?;
        let candidates: Vec<RawCandidate> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse candidates file {:?}", self.path))?;
        Ok(candidates)
    }
}
