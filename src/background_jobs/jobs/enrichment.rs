use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use crate::enrichment::{run_enrichment, EnrichOptions, EnrichReport};
use std::sync::Mutex;

/// Rebuilds the enriched view from the whole raw log and publishes it.
pub struct EnrichmentJob {
    options: EnrichOptions,
    last_report: Mutex<Option<EnrichReport>>,
}

impl EnrichmentJob {
    pub fn new(options: EnrichOptions) -> Self {
        Self {
            options,
            last_report: Mutex::new(None),
        }
    }

    pub fn last_report(&self) -> Option<EnrichReport> {
        self.last_report.lock().unwrap().clone()
    }
}

impl BackgroundJob for EnrichmentJob {
    fn id(&self) -> &'static str {
        "enrichment"
    }

    fn name(&self) -> &'static str {
        "Enrichment"
    }

    fn description(&self) -> &'static str {
        "Attribute, collapse and coalesce raw plays into the enriched view"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let result = ctx
            .retry_policy
            .run("enrichment", &ctx.cancellation_token, || {
                run_enrichment(
                    ctx.raw_store.as_ref(),
                    ctx.enriched_store.as_ref(),
                    &self.options,
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
