//! Playlog Library
//!
//! Reconciles play events from several music services into one append-only
//! log and derives an enriched, deduplicated view from it.

pub mod background_jobs;
pub mod backup;
pub mod config;
pub mod enrichment;
pub mod group_key;
pub mod ingestion;
pub mod play_event;
pub mod play_store;
pub mod retry;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use play_event::{EnrichedEvent, PlayEvent, Source};
pub use play_store::{EnrichedPlayStore, RawPlayStore, SqliteEnrichedPlayStore, SqliteRawPlayStore};
pub use server::{run_server, RequestsLoggingLevel};
