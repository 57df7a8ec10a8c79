//! Watermark guard: keeps only candidates the log has not seen yet.

use crate::play_event::{PlayEvent, Source};
use crate::play_store::RawPlayStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How candidates are compared against stored timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Accept only candidates strictly after the most recent stored play.
    Single,
    /// Accept candidates whose second matches none of the last N stored plays.
    /// Tolerates late arrivals that land between already stored plays.
    Multi,
}

impl WatermarkPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(WatermarkPolicy::Single),
            "multi" => Some(WatermarkPolicy::Multi),
            _ => None,
        }
    }
}

/// The most recent stored play timestamps of one source, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermark {
    timestamps: Vec<DateTime<Utc>>,
}

impl Watermark {
    pub fn new(mut timestamps: Vec<DateTime<Utc>>) -> Self {
        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        Self { timestamps }
    }

    pub fn load(store: &dyn RawPlayStore, source: Source, depth: usize) -> Result<Self> {
        Ok(Self::new(store.recent_timestamps(source, depth)?))
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    fn contains_second(&self, second: i64) -> bool {
        self.timestamps.iter().any(|t| t.timestamp() == second)
    }
}

/// Orders plays by timestamp, oldest first. Equal timestamps keep their order.
pub fn sort_oldest_first(plays: &mut [PlayEvent]) {
    plays.sort_by_key(|p| p.timestamp);
}

/// Result of filtering one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardOutcome {
    /// Unseen candidates, oldest first.
    pub accepted: Vec<PlayEvent>,
    pub skipped: usize,
}

/// Filters `candidates` of `source` down to the ones newer than `watermark`.
///
/// `reverse_chronological` tells that the candidates arrive newest first; they
/// are flipped before the oldest-first sort so that plays sharing a timestamp
/// keep their chronological order. Comparisons use whole seconds.
pub fn filter(
    source: Source,
    policy: WatermarkPolicy,
    mut candidates: Vec<PlayEvent>,
    watermark: &Watermark,
    reverse_chronological: bool,
) -> GuardOutcome {
    if reverse_chronological {
        candidates.reverse();
    }
    sort_oldest_first(&mut candidates);

    if watermark.is_empty() {
        debug!(
            "No {} watermark yet, accepting all {} candidates",
            source,
            candidates.len()
        );
        return GuardOutcome {
            accepted: candidates,
            skipped: 0,
        };
    }

    let total = candidates.len();
    let accepted = candidates
        .into_iter()
        .filter(|candidate| {
            let second = candidate.timestamp.timestamp();
            let keep = match policy {
                WatermarkPolicy::Single => watermark
                    .latest()
                    .map_or(true, |latest| second > latest.timestamp()),
                WatermarkPolicy::Multi => !watermark.contains_second(second),
            };
            if !keep {
                debug!(
                    "Skipping {} play '{}' at {}: already seen",
                    source, candidate.track, candidate.timestamp
                );
            }
            keep
        })
        .collect::<Vec<_>>();

    GuardOutcome {
        skipped: total - accepted.len(),
        accepted,
    }
}
