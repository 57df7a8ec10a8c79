mod enrichment;
mod source_sync;

pub use enrichment::EnrichmentJob;
pub use source_sync::SourceSyncJob;
