//! Runnable units of work: one source sync or one enrichment run.
//!
//! Jobs are synchronous; async callers run them with `spawn_blocking`.

mod context;
mod job;
pub mod jobs;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError};
