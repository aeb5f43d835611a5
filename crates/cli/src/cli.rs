//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Task Log - buffered task outcome logging pipeline
#[derive(Parser, Debug)]
#[command(
    name = "task-log",
    author,
    version,
    about = "Buffered task outcome logging pipeline",
    long_about = "Buffers task and scheduled-job outcomes, periodically aggregates them \n\
                  into per-category counters and ships the filtered records to the \n\
                  configured log sinks through a bounded worker pool."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TASK_LOG_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TASK_LOG_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline against a synthetic workload
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TASK_LOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run time in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "10", env = "TASK_LOG_DURATION")]
    pub duration: u64,

    /// Number of synthetic producer threads
    #[arg(long, default_value = "4", env = "TASK_LOG_PRODUCERS")]
    pub producers: usize,

    /// Outcomes per second per producer
    #[arg(long, default_value = "200", env = "TASK_LOG_RATE")]
    pub rate: u64,

    /// Share of synthetic outcomes that fail (0.0 - 1.0)
    #[arg(long, default_value = "0.1")]
    pub failure_rate: f64,

    /// Override flush interval from configuration
    #[arg(long, env = "TASK_LOG_FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: Option<u64>,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TASK_LOG_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "task-log.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "task-log.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show per-category log levels
    #[arg(long)]
    pub categories: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "task-log",
            "-v",
            "run",
            "--duration",
            "3",
            "--producers",
            "2",
            "--flush-interval-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.duration, 3);
                assert_eq!(args.producers, 2);
                assert_eq!(args.flush_interval_ms, Some(250));
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
