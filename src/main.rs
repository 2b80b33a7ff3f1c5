use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lichtv::config::Config;
use lichtv::pipeline::Aggregator;

#[derive(Parser)]
#[command(
    name = "lichtv",
    version,
    about = "Aggregate TV schedules from multiple sources into one XMLTV guide",
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML); environment variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel registry file (overrides configuration)
    #[arg(long)]
    channels: Option<PathBuf>,

    /// Output document path (overrides configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(channels) = cli.channels {
        config.schedule.channels_path = channels;
    }
    if let Some(output) = cli.output {
        config.output.path = output;
    }

    tracing::info!("lichtv schedule aggregator starting");

    let aggregator = Aggregator::new(config).context("Failed to initialize aggregator")?;
    let summary = aggregator.run().await?;

    tracing::info!(
        path = %summary.output_path.display(),
        channels = summary.channels,
        programmes = summary.programmes,
        sources_ok = summary.sources_ok,
        sources_failed = summary.sources_failed,
        "lichtv completed"
    );

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("lichtv=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("lichtv=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
