use crate::play_store::{EnrichedPlayStore, RawPlayStore};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// The append-only log of raw plays.
    pub raw_store: Arc<dyn RawPlayStore>,

    /// The published enriched view.
    pub enriched_store: Arc<dyn EnrichedPlayStore>,

    /// Applied to every job run as a whole.
    pub retry_policy: RetryPolicy,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        raw_store: Arc<dyn RawPlayStore>,
        enriched_store: Arc<dyn EnrichedPlayStore>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            cancellation_token,
            raw_store,
            enriched_store,
            retry_policy,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
