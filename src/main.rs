//! cafecoder judge
//!
//! Accepts submission lines, judges each one in its own Docker sandbox,
//! and reports verdicts to the backend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cafecoder_judge::{
    config::Config, correlator::Correlator, intake, judge::Judge, sandbox::DockerRuntime,
};

#[derive(Parser, Debug)]
#[command(name = "cafecoder-judge")]
#[command(about = "Judge orchestrator that runs submissions in Docker sandboxes")]
struct Args {
    /// JSON configuration file (overrides CAFECODER_JUDGE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(
        image = %config.image,
        backend = %config.backend_addr,
        control_port = config.control_port,
        "Loaded configuration"
    );

    let runtime = DockerRuntime::connect()?;

    let correlator = Correlator::new();
    let completions = TcpListener::bind(&config.completion_addr)
        .await
        .with_context(|| format!("Failed to bind completion listener {}", config.completion_addr))?;
    tokio::spawn(Arc::clone(&correlator).serve(completions));

    let submissions = TcpListener::bind(&config.intake_addr)
        .await
        .with_context(|| format!("Failed to bind submission listener {}", config.intake_addr))?;

    let judge = Judge::new(Arc::new(config), Arc::new(runtime), correlator);
    intake::serve(judge, submissions).await;

    Ok(())
}
