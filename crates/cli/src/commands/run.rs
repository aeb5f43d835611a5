//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::TaskLogConfig;
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args)?;

    // Apply CLI overrides
    if let Some(interval_ms) = args.flush_interval_ms {
        info!(interval_ms, "Overriding flush interval from CLI");
        config.flush.interval_ms = interval_ms;
        config_loader::ConfigLoader::validate(&config)
            .context("Invalid flush interval override")?;
    }

    info!(
        min_workers = config.pool.min_workers,
        max_workers = config.pool.max_workers,
        flush_interval_ms = config.flush.interval_ms,
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    // Build pipeline configuration
    let pipeline_config = PipelineConfig {
        config,
        duration: if args.duration == 0 {
            None
        } else {
            Some(Duration::from_secs(args.duration))
        },
        producers: args.producers,
        rate: args.rate,
        failure_rate: args.failure_rate,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting pipeline...");

    let stats = pipeline
        .run(setup_shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        runner_outcomes = stats.runner_produced,
        croner_outcomes = stats.croner_produced,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.2}", stats.throughput()),
        drained = stats.drained,
        "Pipeline completed"
    );

    // Print detailed statistics
    stats.print_summary();

    info!("Task Log finished");
    Ok(())
}

fn load_config(args: &RunArgs) -> Result<TaskLogConfig> {
    let Some(path) = &args.config else {
        info!("No configuration file given, using defaults");
        return Ok(TaskLogConfig::default());
    };

    info!(config = %path.display(), "Loading configuration");

    // Validate config path
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Resolve on Ctrl+C or SIGTERM
///
/// If a handler cannot be installed the corresponding branch never fires.
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &TaskLogConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Dispatch pool:");
    println!(
        "  Workers: {}..={} (idle timeout {}s)",
        config.pool.min_workers, config.pool.max_workers, config.pool.idle_timeout_secs
    );
    println!("  Thread prefix: {}", config.pool.thread_name_prefix);
    println!("\nFlush interval: {} ms", config.flush.interval_ms);

    if config.sinks.is_empty() {
        println!("\nSinks: (none, batches go to the tracing log)");
    } else {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    let runner = &config.categories.runner;
    let croner = &config.categories.croner;
    if !runner.is_empty() || !croner.is_empty() {
        println!("\nCategory levels:");
        println!("  Runner: {} configured", runner.len());
        println!("  Croner: {} configured", croner.len());
    }

    println!();
}
