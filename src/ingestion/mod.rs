mod appender;
mod candidates;
mod sync;
mod watermark;
mod webhook;

pub use appender::{insert_id, AppendError, AppendReport, Appender, DEFAULT_CHUNK_SIZE};
pub use candidates::{CandidateSource, JsonFileCandidateSource};
pub use sync::{
    collapse_repeats, sync_source, SyncError, SyncOptions, SyncReport, MAX_WATERMARK_DEPTH,
};
pub use watermark::{filter, sort_oldest_first, GuardOutcome, Watermark, WatermarkPolicy};
pub use webhook::{now_playing_event, parse_message, MessageError};
