use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use ponci_cli::{execute, Cli, Commands, Config, LogConfig};
use ponci_core::{CancellationToken, CgroupManager, VERSION};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_overrides(cli.prefix.clone(), cli.timeout);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    // Dropping the guard flushes the file writer
    let _guard = init_logging(&config.logging)?;
    debug!("ponci v{} starting", VERSION);

    if let Commands::GenerateConfig { output } = &cli.command {
        return generate_config(output);
    }

    let cancel = CancellationToken::new();
    let manager = CgroupManager::new(config.cgroup)?.with_cancellation(cancel.clone());

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let command = cli.command;
    let message = tokio::task::spawn_blocking(move || execute(&manager, &command))
        .await
        .context("Command task panicked")??;

    println!("{}", message.green());
    Ok(())
}

/// Initialize logging to stderr, plus a daily file when `log_dir` is set
fn init_logging(logging: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level: {}", logging.level))?;

    let (file_layer, guard) = match &logging.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, &logging.log_file);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(false),
        )
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

/// Generate default configuration file
fn generate_config(output: &Path) -> Result<()> {
    let config = Config::default();
    config.save_to_file(output)?;

    info!("Default configuration written to {}", output.display());
    println!(
        "{}",
        format!("Configuration written to {}", output.display()).green()
    );
    Ok(())
}
