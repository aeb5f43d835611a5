//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{LogLevel, SinkType, TaskLogConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    min_workers: usize,
    max_workers: usize,
    flush_interval_ms: u64,
    sink_count: usize,
    runner_categories: usize,
    croner_categories: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    min_workers: config.pool.min_workers,
                    max_workers: config.pool.max_workers,
                    flush_interval_ms: config.flush.interval_ms,
                    sink_count: config.sinks.len(),
                    runner_categories: config.categories.runner.len(),
                    croner_categories: config.categories.croner.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &TaskLogConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - batches will only be written to the tracing log".to_string());
    }

    if config.pool.min_workers == 0 {
        warnings.push(
            "pool.min_workers = 0 - every idle dispatch worker will be reclaimed".to_string(),
        );
    }

    for sink in &config.sinks {
        if sink.sink_type == SinkType::File && !sink.params.contains_key("base_path") {
            warnings.push(format!(
                "File sink '{}' has no base_path - writing under ./task-logs",
                sink.name
            ));
        }
    }

    // Blank keys never match: records with a blank class are always shipped
    for (kind, levels) in [
        ("runner", &config.categories.runner),
        ("croner", &config.categories.croner),
    ] {
        if levels.keys().any(|class| class.trim().is_empty()) {
            warnings.push(format!(
                "categories.{kind} has a blank task class - it is ignored"
            ));
        }
        let mut silenced: Vec<&str> = levels
            .iter()
            .filter(|(_, level)| **level == LogLevel::None)
            .map(|(class, _)| class.as_str())
            .collect();
        if !silenced.is_empty() {
            silenced.sort_unstable();
            warnings.push(format!(
                "categories.{kind}: records of {} are counted but never shipped",
                silenced.join(", ")
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Workers: {}..={}",
                summary.min_workers, summary.max_workers
            );
            println!("  Flush interval: {} ms", summary.flush_interval_ms);
            println!("  Sinks: {}", summary.sink_count);
            println!(
                "  Category levels: {} runner, {} croner",
                summary.runner_categories, summary.croner_categories
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_warns_about_sinks() {
        let warnings = collect_warnings(&TaskLogConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("No sinks configured"));
    }

    #[test]
    fn test_silenced_categories_reported() {
        let mut config = TaskLogConfig::default();
        config.sinks.push(contracts::SinkConfig::log("log"));
        config
            .categories
            .runner
            .insert("app.B".to_string(), LogLevel::None);
        config
            .categories
            .runner
            .insert("app.A".to_string(), LogLevel::None);
        config
            .categories
            .runner
            .insert("app.C".to_string(), LogLevel::Record);

        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("app.A, app.B"));
        assert!(!warnings[0].contains("app.C"));
    }

    #[test]
    fn test_validate_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/task-log.toml".into(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_validate_invalid_pool() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[pool]\nmin_workers = 4\nmax_workers = 2\n")
            .unwrap();

        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.summary.is_none());
    }
}
