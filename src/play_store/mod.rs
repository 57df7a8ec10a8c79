mod codec;
mod enriched_store;
mod models;
mod raw_store;
mod schema;
mod trait_def;

pub use enriched_store::SqliteEnrichedPlayStore;
pub use models::{DecodeError, InsertOutcome, PlayFilter, PlayStoreStats, RowError};
pub use raw_store::SqliteRawPlayStore;
pub use trait_def::{EnrichedPlayStore, RawPlayStore};
