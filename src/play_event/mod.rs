mod models;
mod normalizer;

pub use models::{EnrichedEvent, PlayEvent, Source, SourceIds, StoredPlay};
pub use normalizer::{normalize, NormalizeError, RawCandidate, YOUTUBE_MUSIC_CATEGORIES};
