//! TraceBench - controller-driven tracer load generator
//!
//! CLI entry point: connects to the collector, then runs experiments until the
//! controller terminates the stream.

use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, error, info};

use tracebench::cli::Cli;
use tracebench::config::Config;
use tracebench::{BenchClient, HttpController, LogPayload};
use tracecollect::{Collector, CollectorClient, RecordingTracer, new_reporter_id, process_attributes};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(url) = cli.controller_url {
        config.controller.base_url = url;
    }
    if let Some(url) = cli.collector_url {
        config.collector.base_url = url;
    }
    config.validate().context("Invalid configuration")?;
    debug!(?config, "main: configuration resolved");

    let reporter_id = new_reporter_id();
    let attributes = process_attributes(&config.reporter.component_name, reporter_id, &config.reporter.tags);
    let collector = Arc::new(
        CollectorClient::new(&config.collector.options(), reporter_id, attributes)
            .context("Failed to create collector client")?,
    );
    collector.connect().context("Failed to connect collector client")?;
    info!(url = %collector.url(), reporter_id = %format!("{:x}", reporter_id), "main: collector ready");

    let recorder = Arc::new(RecordingTracer::new(
        collector.clone(),
        config.collector.max_buffered_spans,
    ));
    let controller = Arc::new(
        HttpController::new(&config.controller.base_url, config.controller.timeout())
            .context("Failed to create controller client")?,
    );

    let client = BenchClient::new(controller, recorder, LogPayload::new(config.workload.max_bytes_per_log))
        .with_paths(&config.controller.control_path, &config.controller.result_path);

    let outcome = client.run().await;
    collector.close();

    match outcome {
        Ok(summary) => {
            info!(
                experiments = summary.experiments,
                flush_total = ?summary.total_flush_duration,
                dropped_spans = summary.dropped_spans,
                "main: run complete"
            );
            println!(
                "completed {} experiments ({} traced, {:.6}s flushing)",
                summary.experiments,
                summary.traced_experiments,
                summary.total_flush_duration.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            error!(fatal = e.is_fatal(), error = %e, "main: run aborted");
            Err(e).context("Benchmark run aborted")
        }
    }
}
