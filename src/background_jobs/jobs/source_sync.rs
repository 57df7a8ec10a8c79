//! Incremental sync of one source into the raw log.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use crate::ingestion::{sync_source, CandidateSource, SyncOptions, SyncReport};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Fetches the recent plays of one source and appends the new ones.
///
/// The whole sync is retried by the context's retry policy; the watermark
/// keeps repeated attempts from appending anything twice.
pub struct SourceSyncJob {
    candidates: Arc<dyn CandidateSource>,
    options: SyncOptions,
    last_report: Mutex<Option<SyncReport>>,
}

impl SourceSyncJob {
    pub fn new(candidates: Arc<dyn CandidateSource>, options: SyncOptions) -> Self {
        Self {
            candidates,
            options,
            last_report: Mutex::new(None),
        }
    }

    /// Report of the last successful execution.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().unwrap().clone()
    }
}

impl BackgroundJob for SourceSyncJob {
    fn id(&self) -> &'static str {
        "source_sync"
    }

    fn name(&self) -> &'static str {
        "Source Sync"
    }

    fn description(&self) -> &'static str {
        "Append new plays reported by a source to the raw log"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let source = self.candidates.source();
        let label = format!("{} sync", source);
        info!("Starting {}", label);

        let result = ctx.retry_policy.run(&label, &ctx.cancellation_token, || {
            sync_source(
                self.candidates.as_ref(),
                ctx.raw_store.as_ref(),
                &self.options,
                Utc::now(),
            )
        });

        match result {
            Ok(report) => {
                *self.last_report.lock().unwrap() = Some(report);
                Ok(())
            }
            Err(_) if ctx.is_cancelled() => Err(JobError::Cancelled),
            Err(err) => Err(JobError::ExecutionFailed(err.to_string())),
        }
    }
}
