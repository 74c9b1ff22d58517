use anyhow::Context;
use clap::Parser;
use foreman::cli::{Args, BatchFile, Commands, ConfigDiscovery};
use foreman::task::validate_batch;
use foreman::worker::CategoryRegistry;
use foreman::{Engine, EngineConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("foreman=info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            file,
            config,
            report_json,
        } => run_batch(file, config, report_json).await,
        Commands::Validate { file, config } => validate_batch_file(file, config),
        Commands::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(())
        }
    }
}

async fn run_batch(
    file: PathBuf,
    config_override: Option<PathBuf>,
    report_json: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_override)?;
    let batch = BatchFile::load(&file)?;
    let (config, tasks) = batch.into_submission(config);

    info!("Loaded {} tasks from {}", tasks.len(), file.display());

    let engine = Engine::new(config).context("invalid worker category configuration")?;
    let handle = engine.submit(tasks).context("batch rejected")?;

    let trigger = handle.shutdown_trigger();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down gracefully");
            trigger.request();
        }
    });

    let report = handle.await_completion().await?;
    report.log_summary();

    if let Some(path) = report_json {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!("report written to {}", path.display());
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_batch_file(file: PathBuf, config_override: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_override)?;
    let batch = BatchFile::load(&file)?;
    let (config, tasks) = batch.into_submission(config);

    let registry = CategoryRegistry::from_configs(config.categories.clone())
        .context("invalid worker category configuration")?;
    validate_batch(&tasks, &registry).context("batch rejected")?;

    println!(
        "OK: {} tasks across {} categories",
        tasks.len(),
        registry.len()
    );
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration override from: {:?}", path);
            EngineConfig::from_toml_file(&path)
                .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display()))
        }
        None => ConfigDiscovery::discover_config()
            .map_err(|e| anyhow::anyhow!("config discovery failed: {e}")),
    }
}
