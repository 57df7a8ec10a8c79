//! A full enrichment run: raw log in, enriched view out.

use super::attribution::attribute;
use super::coalescer::{coalesce, count_groups};
use super::now_playing::collapse_now_playing;
use super::publisher::{PublishOutcome, Publisher};
use crate::play_store::{DecodeError, EnrichedPlayStore, PlayFilter, RawPlayStore};
use crate::retry::Retryable;
use crate::server::metrics;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),

    #[error("Decode error: {0}")]
    Decode(DecodeError),

    #[error("Publish error: {0:#}")]
    Publish(anyhow::Error),
}

impl Retryable for EnrichError {
    fn is_retryable(&self) -> bool {
        match self {
            EnrichError::Store(_) | EnrichError::Publish(_) => true,
            EnrichError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    pub attribution_cutoff: DateTime<Utc>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub read: usize,
    /// Rows whose source had to be inferred.
    pub attributed: usize,
    /// Now-playing repeats dropped.
    pub collapsed: usize,
    pub groups: usize,
    pub published: usize,
    pub dry_run: bool,
}

/// Recomputes the enriched view from every raw row and publishes it.
pub fn run_enrichment(
    raw_store: &dyn RawPlayStore,
    enriched_store: &dyn EnrichedPlayStore,
    options: &EnrichOptions,
) -> Result<EnrichReport, EnrichError> {
    let result = enrich(raw_store, enriched_store, options);
    match &result {
        Ok(report) => metrics::record_enrichment_run(
            if report.dry_run { "dry_run" } else { "success" },
            (!report.dry_run).then_some(report.published),
        ),
        Err(_) => metrics::record_enrichment_run("failure", None),
    }
    result
}

fn enrich(
    raw_store: &dyn RawPlayStore,
    enriched_store: &dyn EnrichedPlayStore,
    options: &EnrichOptions,
) -> Result<EnrichReport, EnrichError> {
    // Newest first, as the now-playing collapse expects
    let stored = raw_store
        .query_all(&PlayFilter::default())
        .map_err(|err| match err.downcast::<DecodeError>() {
            Ok(decode) => EnrichError::Decode(decode),
            Err(other) => EnrichError::Store(other),
        })?;

    let mut report = EnrichReport {
        read: stored.len(),
        dry_run: options.dry_run,
        ..Default::default()
    };

    report.attributed = stored.iter().filter(|p| p.source.is_none()).count();
    let plays = stored
        .into_iter()
        .map(|p| attribute(p, options.attribution_cutoff))
        .collect::<Vec<_>>();
    debug!("Inferred sources for {} rows", report.attributed);

    let plays = collapse_now_playing(plays);
    report.collapsed = report.read - plays.len();

    let enriched = coalesce(plays);
    report.groups = count_groups(&enriched);

    let outcome = Publisher::new(enriched_store, options.dry_run)
        .publish(&enriched)
        .map_err(EnrichError::Publish)?;
    report.published = match outcome {
        PublishOutcome::Published(rows) => rows,
        PublishOutcome::DryRun(_) => 0,
    };

    info!(
        "Enrichment: {} rows read, {} sources inferred, {} now-playing repeats dropped, {} groups, {} rows published{}",
        report.read,
        report.attributed,
        report.collapsed,
        report.groups,
        report.published,
        if report.dry_run { " (dry run)" } else { "" }
    );
    Ok(report)
}
