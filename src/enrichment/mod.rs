mod attribution;
mod coalescer;
mod now_playing;
mod pipeline;
mod publisher;

pub use attribution::{attribute, default_cutoff, infer_source};
pub use coalescer::{coalesce, count_groups, mean_nonzero_duration, plurality, Representative};
pub use now_playing::collapse_now_playing;
pub use pipeline::{run_enrichment, EnrichError, EnrichOptions, EnrichReport};
pub use publisher::{PublishOutcome, Publisher};
