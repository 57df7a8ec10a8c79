use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use playlog::background_jobs::jobs::{EnrichmentJob, SourceSyncJob};
use playlog::background_jobs::{BackgroundJob, JobContext};
use playlog::backup::{export_ndjson, import_ndjson};
use playlog::config;
use playlog::enrichment::EnrichOptions;
use playlog::ingestion::{JsonFileCandidateSource, SyncOptions};
use playlog::play_event::Source;
use playlog::play_store::{
    EnrichedPlayStore, RawPlayStore, SqliteEnrichedPlayStore, SqliteRawPlayStore,
};
use playlog::retry::RetryPolicy;
use playlog::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

fn parse_source(s: &str) -> Result<Source, String> {
    match Source::parse(s) {
        Some(Source::Unknown) | None => Err(format!(
            "Unknown source '{}', expected one of: {}",
            s,
            Source::ALL
                .iter()
                .filter(|source| **source != Source::Unknown)
                .map(|source| source.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        Some(source) => Ok(source),
    }
}

#[derive(Parser, Debug)]
#[command(name = "playlog", about = "Reconcile and enrich listening history")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing the database files (plays.db, enriched.db).
    /// Can also be specified in config file.
    #[clap(long, global = true, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Log what would be written without touching any store.
    #[clap(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// The port the webhook server listens on.
    #[clap(short, long, global = true, default_value_t = 8080)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, global = true, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, global = true, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Shared secret webhook submissions must carry.
    #[clap(long, global = true)]
    pub webhook_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Appends the new plays of one source to the raw log.
    Sync {
        #[clap(value_parser = parse_source)]
        source: Source,

        /// JSON array of candidate plays exported from the source.
        #[clap(long, value_parser = parse_path)]
        candidates: PathBuf,
    },

    /// Rebuilds and publishes the enriched view.
    Enrich,

    /// Serves the now-playing webhook and the metrics endpoint.
    Serve,

    /// Exports or restores the raw log.
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    /// Writes every raw row to a newline-delimited JSON file.
    Export {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Restores rows from a newline-delimited JSON file.
    Import {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            webhook_token: args.webhook_token.clone(),
            dry_run: args.dry_run,
        }
    }
}

fn open_raw_store(app_config: &config::AppConfig) -> Result<Arc<SqliteRawPlayStore>> {
    if !app_config.raw_db_path().exists() {
        info!(
            "Creating new raw play database at {:?}",
            app_config.raw_db_path()
        );
    }
    Ok(Arc::new(SqliteRawPlayStore::new(app_config.raw_db_path())?))
}

fn open_enriched_store(app_config: &config::AppConfig) -> Result<Arc<SqliteEnrichedPlayStore>> {
    if !app_config.enriched_db_path().exists() {
        info!(
            "Creating new enriched play database at {:?}",
            app_config.enriched_db_path()
        );
    }
    Ok(Arc::new(SqliteEnrichedPlayStore::new(
        app_config.enriched_db_path(),
    )?))
}

/// Runs `job` on the blocking pool, cancelling it on Ctrl+C.
async fn run_job(job: Arc<dyn BackgroundJob>, ctx: JobContext) -> Result<()> {
    info!("Running job {} ({})", job.name(), job.description());
    let shutdown_token = ctx.cancellation_token.clone();
    let job_id = job.id();
    let mut handle = tokio::task::spawn_blocking(move || job.execute(&ctx));

    let result = tokio::select! {
        result = &mut handle => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling {}", job_id);
            shutdown_token.cancel();
            handle.await
        }
    };
    result
        .with_context(|| format!("Job {} panicked", job_id))?
        .with_context(|| format!("Job {} failed", job_id))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  dry_run: {}", app_config.dry_run);

    metrics::init_metrics();

    let raw_store = open_raw_store(&app_config)?;

    match cli_args.command {
        Command::Sync { source, candidates } => {
            let ctx = JobContext::new(
                CancellationToken::new(),
                raw_store,
                open_enriched_store(&app_config)? as Arc<dyn EnrichedPlayStore>,
                RetryPolicy::new(&app_config.retry),
            );
            let options = SyncOptions::for_source(&app_config.ingestion, source, app_config.dry_run);
            let job = Arc::new(SourceSyncJob::new(
                Arc::new(JsonFileCandidateSource::new(source, candidates)),
                options,
            ));
            run_job(job.clone(), ctx).await?;
            if let Some(report) = job.last_report() {
                info!("{:?}", report);
            }
        }
        Command::Enrich => {
            let ctx = JobContext::new(
                CancellationToken::new(),
                raw_store,
                open_enriched_store(&app_config)? as Arc<dyn EnrichedPlayStore>,
                RetryPolicy::new(&app_config.retry),
            );
            let job = Arc::new(EnrichmentJob::new(EnrichOptions {
                attribution_cutoff: app_config.enrichment.attribution_cutoff,
                dry_run: app_config.dry_run,
            }));
            run_job(job.clone(), ctx).await?;
            if let Some(report) = job.last_report() {
                info!("{:?}", report);
            }
        }
        Command::Serve => {
            let server_config = ServerConfig {
                requests_logging_level: app_config.logging_level.clone(),
                port: app_config.port,
                metrics_port: app_config.metrics_port,
                webhook_token: app_config.require_webhook_token()?,
                dry_run: app_config.dry_run,
                append_chunk_size: app_config.ingestion.append_chunk_size,
            };
            tokio::select! {
                result = run_server(server_config, raw_store as Arc<dyn RawPlayStore>) => {
                    info!("HTTP server stopped: {:?}", result);
                    result?
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
            }
        }
        Command::Backup { command } => match command {
            BackupCommand::Export { file } => {
                let writer = BufWriter::new(
                    File::create(&file)
                        .with_context(|| format!("Failed to create backup file {:?}", file))?,
                );
                let rows = export_ndjson(raw_store.as_ref(), writer)?;
                info!("Wrote {} rows to {:?}", rows, file);
            }
            BackupCommand::Import { file } => {
                if !file.exists() {
                    bail!("Backup file does not exist: {:?}", file);
                }
                let reader = BufReader::new(
                    File::open(&file)
                        .with_context(|| format!("Failed to open backup file {:?}", file))?,
                );
                let outcome = import_ndjson(
                    raw_store.as_ref(),
                    reader,
                    app_config.ingestion.append_chunk_size,
                    app_config.dry_run,
                )?;
                if !outcome.rejected.is_empty() {
                    bail!(
                        "{} rows of {:?} were rejected, first: #{} ({})",
                        outcome.rejected.len(),
                        file,
                        outcome.rejected[0].index,
                        outcome.rejected[0].reason
                    );
                }
            }
        },
    }

    Ok(())
}
