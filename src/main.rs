use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rebroadcast::broadcast::FfmpegBroadcaster;
use rebroadcast::config::Config;
use rebroadcast::error::RebroadcastErrorTrait;
use rebroadcast::fetcher::{ArtifactFetcher, YtDlpRetriever};
use rebroadcast::logging;
use rebroadcast::scheduler::{Pipeline, RotationScheduler, RotationTiming, ShutdownHandle};
use rebroadcast::selector::{CandidateSelector, SelectionPolicy};
use rebroadcast::source::{ApiKey, ContentLocator, TokenFile, TokenProvider, YouTubeLocator};
use rebroadcast::storage::{ArtifactStore, RetentionCleaner};
use rebroadcast::utils::format_hm;

#[derive(Parser)]
#[command(
    name = "rebroadcast",
    version,
    about = "Unattended rotation of archived live streams onto an RTMP endpoint",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment overrides still apply
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Also append logs to this file; defaults to the configured file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broadcast rotation until interrupted
    Run,

    /// Run one selection and print the chosen candidate
    Select,

    /// Run one retention sweep over the artifact directory
    Sweep,

    /// Print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    let log_file = cli.log_file.as_deref().or(config.logging.file.as_deref());
    setup_tracing(log_format, cli.verbose, &config.logging.level, log_file)?;

    tracing::info!("rebroadcast starting");

    match cli.command {
        Commands::Run => {
            tracing::info!(
                channel_id = %config.source.channel_id,
                ingest_url = %config.broadcast.ingest_url,
                artifact_dir = %config.storage.artifact_dir.display(),
                "Starting run command"
            );
            run(config).await?;
        }
        Commands::Select => {
            tracing::info!(channel_id = %config.source.channel_id, "Starting select command");
            select(&config).await?;
        }
        Commands::Sweep => {
            tracing::info!(
                artifact_dir = %config.storage.artifact_dir.display(),
                "Starting sweep command"
            );
            sweep(&config).await?;
        }
        Commands::CheckConfig => check_config(&config)?,
    }

    tracing::info!("rebroadcast completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool, level: &str, log_file: Option<&Path>) -> Result<()> {
    let env_filter = if verbose {
        EnvFilter::new("rebroadcast=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("rebroadcast={level},warn")))
    };

    let json = format == "json";
    let file = match log_file {
        Some(path) => Some(
            logging::open_log_file(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?,
        ),
        None => None,
    };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .with(file.map(|file| logging::file_layer(file, json)))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .with(file.map(|file| logging::file_layer(file, json)))
            .try_init()?;
    }

    if let Some(path) = log_file {
        tracing::info!(path = %path.display(), "Logging to file");
    }

    Ok(())
}

/// Build the credential provider and make sure it yields a usable credential
async fn build_credentials(config: &Config) -> rebroadcast::error::Result<Arc<dyn TokenProvider>> {
    let provider: Arc<dyn TokenProvider> = match &config.source.api_key {
        Some(key) => {
            tracing::info!("Using API key for content source queries");
            Arc::new(ApiKey(key.clone()))
        }
        None => {
            let client = reqwest::Client::builder()
                .timeout(config.request_timeout())
                .build()
                .map_err(|e| rebroadcast::error::Error::with_source("Failed to build HTTP client", e))?;
            Arc::new(TokenFile::load(&config.source.token_file, client)?)
        }
    };

    provider.credential().await?;
    Ok(provider)
}

async fn build_locator(config: &Config) -> Result<Arc<dyn ContentLocator>> {
    if config.source.channel_id.is_empty() {
        anyhow::bail!("source.channel_id must be set");
    }

    let credentials = match build_credentials(config).await {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!(
                category = %e.category(),
                recoverable = e.is_recoverable(),
                error = %e,
                "Authentication failed"
            );
            return Err(e).context("Unable to authenticate with the content source");
        }
    };

    let locator = YouTubeLocator::with_base_url(
        &config.source.api_base_url,
        credentials,
        config.request_timeout(),
    )?;
    Ok(Arc::new(locator))
}

async fn run(config: Config) -> Result<()> {
    if config.broadcast.stream_key.is_empty() {
        anyhow::bail!("broadcast.stream_key must be set");
    }

    let locator = build_locator(&config).await?;

    let selector = CandidateSelector::new(locator, SelectionPolicy::from_config(&config));
    let store = ArtifactStore::new(&config.storage.artifact_dir).with_context(|| {
        format!(
            "Failed to create artifact directory: {}",
            config.storage.artifact_dir.display()
        )
    })?;
    let retriever = Arc::new(YtDlpRetriever::from_config(&config.fetch));
    let fetcher = ArtifactFetcher::from_config(store, retriever, &config.fetch);
    let cleaner = RetentionCleaner::new(&config.storage.artifact_dir, config.retention());

    let pipeline = Arc::new(Pipeline::new(selector, fetcher, cleaner));
    let broadcaster = Arc::new(FfmpegBroadcaster::from_config(&config));
    let mut scheduler =
        RotationScheduler::new(pipeline, broadcaster, RotationTiming::from_config(&config));

    spawn_signal_listener(scheduler.shutdown_handle());
    spawn_event_logger(&scheduler);

    scheduler.run().await;
    Ok(())
}

async fn select(config: &Config) -> Result<()> {
    let locator = build_locator(config).await?;
    let selector = CandidateSelector::new(locator, SelectionPolicy::from_config(config));

    match selector.select().await {
        Some(candidate) => {
            println!("Selected live stream:");
            println!("  ID: {}", candidate.id);
            println!("  Title: {}", candidate.title);
            println!("  URL: {}", candidate.url);
            println!("  Published: {}", candidate.published_at);
            if let Some(duration) = candidate.declared_duration {
                println!("  Duration: {}", format_hm(duration));
            }
        }
        None => println!("No eligible live stream found"),
    }

    Ok(())
}

async fn sweep(config: &Config) -> Result<()> {
    let cleaner = RetentionCleaner::new(&config.storage.artifact_dir, config.retention());
    let report = cleaner.sweep().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check_config(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if !shown.broadcast.stream_key.is_empty() {
        shown.broadcast.stream_key = String::from("<redacted>");
    }
    if shown.source.api_key.is_some() {
        shown.source.api_key = Some(String::from("<redacted>"));
    }

    println!("{}", toml::to_string_pretty(&shown)?);
    println!("Configuration is valid");
    Ok(())
}

/// Stop the rotation on Ctrl-C or SIGTERM
fn spawn_signal_listener(handle: ShutdownHandle) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received, stopping rotation");
        handle.shutdown();
    });
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl_c");
        std::future::pending::<()>().await;
    }
}

/// Mirror rotation events into the log as JSON at debug level
fn spawn_event_logger(scheduler: &RotationScheduler) {
    let mut events = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!(target: "rebroadcast::events", event = %json),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize rotation event"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
