use crate::play_event::EnrichedEvent;
use crate::play_store::EnrichedPlayStore;
use anyhow::Result;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(usize),
    /// Nothing was written; holds the number of rows that would have been.
    DryRun(usize),
}

/// Swaps a freshly computed enriched view into the store.
pub struct Publisher<'a> {
    store: &'a dyn EnrichedPlayStore,
    dry_run: bool,
}

impl<'a> Publisher<'a> {
    pub fn new(store: &'a dyn EnrichedPlayStore, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    pub fn publish(&self, rows: &[EnrichedEvent]) -> Result<PublishOutcome> {
        if self.dry_run {
            info!("Dry run: not publishing {} enriched rows", rows.len());
            return Ok(PublishOutcome::DryRun(rows.len()));
        }
        self.store.atomic_replace(rows)?;
        info!("Published {} enriched rows", rows.len());
        Ok(PublishOutcome::Published(rows.len()))
    }
}
