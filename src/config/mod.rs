mod file_config;

pub use file_config::{EnrichmentConfig, FileConfig, IngestionConfig, RetryConfig};

use crate::enrichment::default_cutoff;
use crate::ingestion::{WatermarkPolicy, DEFAULT_CHUNK_SIZE, MAX_WATERMARK_DEPTH};
use crate::play_event::Source;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const RAW_DB_FILE: &str = "plays.db";
pub const ENRICHED_DB_FILE: &str = "enriched.db";

/// Settings for the watermark guard and the appender
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionSettings {
    pub watermark_depth: usize,
    pub append_chunk_size: usize,
    /// Sources not listed here use [`WatermarkPolicy::Single`].
    pub policies: BTreeMap<Source, WatermarkPolicy>,
}

impl IngestionSettings {
    pub fn policy_for(&self, source: Source) -> WatermarkPolicy {
        self.policies
            .get(&source)
            .copied()
            .unwrap_or(WatermarkPolicy::Single)
    }
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            watermark_depth: MAX_WATERMARK_DEPTH,
            append_chunk_size: DEFAULT_CHUNK_SIZE,
            // Spotify's recently-played feed reorders plays across calls
            policies: BTreeMap::from([(Source::Spotify, WatermarkPolicy::Multi)]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentSettings {
    pub attribution_cutoff: DateTime<Utc>,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            attribution_cutoff: default_cutoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub max_elapsed_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_secs: 60,
            backoff_multiplier: 1.5,
            max_elapsed_secs: 180,
        }
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub webhook_token: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub webhook_token: Option<String>,
    pub dry_run: bool,

    pub ingestion: IngestionSettings,
    pub enrichment: EnrichmentSettings,
    pub retry: RetrySettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present, except `dry_run` which
    /// is on if either side asks for it.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = match file.logging_level {
            Some(s) => parse_logging_level(&s)
                .with_context(|| format!("Invalid logging_level '{}'", s))?,
            None => cli.logging_level.clone(),
        };

        let webhook_token = file
            .webhook_token
            .or_else(|| cli.webhook_token.clone())
            .filter(|t| !t.trim().is_empty());

        let dry_run = cli.dry_run || file.dry_run.unwrap_or(false);

        let ingestion = resolve_ingestion(file.ingestion.unwrap_or_default())?;
        let enrichment = resolve_enrichment(file.enrichment.unwrap_or_default())?;
        let retry = resolve_retry(file.retry.unwrap_or_default())?;

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            webhook_token,
            dry_run,
            ingestion,
            enrichment,
            retry,
        })
    }

    pub fn raw_db_path(&self) -> PathBuf {
        self.db_dir.join(RAW_DB_FILE)
    }

    pub fn enriched_db_path(&self) -> PathBuf {
        self.db_dir.join(ENRICHED_DB_FILE)
    }

    /// The shared secret webhook submissions must carry. Required to serve.
    pub fn require_webhook_token(&self) -> Result<String> {
        self.webhook_token.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "webhook_token must be specified via --webhook-token or in config file"
            )
        })
    }
}

fn resolve_ingestion(file: IngestionConfig) -> Result<IngestionSettings> {
    let defaults = IngestionSettings::default();

    let watermark_depth = file.watermark_depth.unwrap_or(defaults.watermark_depth);
    if !(1..=MAX_WATERMARK_DEPTH).contains(&watermark_depth) {
        bail!(
            "ingestion.watermark_depth must be between 1 and {}, got {}",
            MAX_WATERMARK_DEPTH,
            watermark_depth
        );
    }

    let append_chunk_size = file.append_chunk_size.unwrap_or(defaults.append_chunk_size);
    if append_chunk_size == 0 {
        bail!("ingestion.append_chunk_size must be at least 1");
    }

    let mut policies = defaults.policies;
    for (name, policy) in file.policies.unwrap_or_default() {
        let source = Source::parse(&name)
            .with_context(|| format!("Unknown source '{}' in ingestion.policies", name))?;
        let policy = WatermarkPolicy::parse(&policy).with_context(|| {
            format!(
                "Invalid watermark policy '{}' for {}, expected 'single' or 'multi'",
                policy, name
            )
        })?;
        policies.insert(source, policy);
    }

    Ok(IngestionSettings {
        watermark_depth,
        append_chunk_size,
        policies,
    })
}

fn resolve_enrichment(file: EnrichmentConfig) -> Result<EnrichmentSettings> {
    let attribution_cutoff = match file.attribution_cutoff {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .with_context(|| format!("Invalid enrichment.attribution_cutoff '{}'", s))?
            .with_timezone(&Utc),
        None => default_cutoff(),
    };
    Ok(EnrichmentSettings { attribution_cutoff })
}

fn resolve_retry(file: RetryConfig) -> Result<RetrySettings> {
    let defaults = RetrySettings::default();
    let settings = RetrySettings {
        initial_backoff_ms: file.initial_backoff_ms.unwrap_or(defaults.initial_backoff_ms),
        max_backoff_secs: file.max_backoff_secs.unwrap_or(defaults.max_backoff_secs),
        backoff_multiplier: file.backoff_multiplier.unwrap_or(defaults.backoff_multiplier),
        max_elapsed_secs: file.max_elapsed_secs.unwrap_or(defaults.max_elapsed_secs),
    };
    if !settings.backoff_multiplier.is_finite() || settings.backoff_multiplier < 1.0 {
        bail!(
            "retry.backoff_multiplier must be at least 1.0, got {}",
            settings.backoff_multiplier
        );
    }
    if settings.initial_backoff_ms == 0 {
        bail!("retry.initial_backoff_ms must be positive");
    }
    Ok(settings)
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
