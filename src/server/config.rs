use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub metrics_port: u16,
    /// Shared secret every webhook submission must carry in `key`.
    pub webhook_token: String,
    /// Parsed submissions are logged and not stored.
    pub dry_run: bool,
    pub append_chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 8080,
            metrics_port: 9091,
            webhook_token: String::new(),
            dry_run: false,
            append_chunk_size: crate::ingestion::DEFAULT_CHUNK_SIZE,
        }
    }
}
