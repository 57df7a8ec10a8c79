//! Shared constants for end-to-end tests

/// Webhook secret the test server is configured with
pub const WEBHOOK_TOKEN: &str = "test-webhook-token";

/// Base of every fixture timestamp (2023-11-14T22:13:20Z)
pub const BASE_EPOCH_SECS: i64 = 1_700_000_000;

/// Chunk size small enough that fixtures span several chunks
pub const TEST_CHUNK_SIZE: usize = 2;

// ============================================================================
// Timeouts
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

pub const REQUEST_TIMEOUT_SECS: u64 = 10;
