//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{LogLevel, TaskLogConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    pool: PoolInfo,
    flush_interval_ms: u64,
    sinks: Vec<SinkInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    categories: Option<CategoryInfo>,
}

#[derive(Serialize)]
struct PoolInfo {
    min_workers: usize,
    max_workers: usize,
    idle_timeout_secs: u64,
    thread_name_prefix: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct CategoryInfo {
    runner: BTreeMap<String, LogLevel>,
    croner: BTreeMap<String, LogLevel>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &TaskLogConfig, args: &InfoArgs) -> ConfigInfo {
    let sinks = config
        .sinks
        .iter()
        .map(|s| SinkInfo {
            name: s.name.clone(),
            sink_type: format!("{:?}", s.sink_type),
            params: s.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
        .collect();

    let categories = args.categories.then(|| CategoryInfo {
        runner: sorted(&config.categories.runner),
        croner: sorted(&config.categories.croner),
    });

    ConfigInfo {
        version: format!("{:?}", config.version),
        pool: PoolInfo {
            min_workers: config.pool.min_workers,
            max_workers: config.pool.max_workers,
            idle_timeout_secs: config.pool.idle_timeout_secs,
            thread_name_prefix: config.pool.thread_name_prefix.clone(),
        },
        flush_interval_ms: config.flush.interval_ms,
        sinks,
        categories,
    }
}

fn sorted(levels: &std::collections::HashMap<String, LogLevel>) -> BTreeMap<String, LogLevel> {
    levels.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

fn tree_prefix(i: usize, len: usize) -> &'static str {
    if i + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Task Log Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Dispatch Pool");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Min workers: {}", info.pool.min_workers);
    println!("   ├─ Max workers: {}", info.pool.max_workers);
    println!("   ├─ Idle timeout: {}s", info.pool.idle_timeout_secs);
    println!("   └─ Thread prefix: {}", info.pool.thread_name_prefix);

    println!("\n⏱  Flush");
    println!("   └─ Interval: {} ms", info.flush_interval_ms);

    if info.sinks.is_empty() {
        println!("\n📤 Sinks");
        println!("   └─ (none, tracing log)");
    } else {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let is_last = i + 1 == info.sinks.len();
            let child_prefix = if is_last { "   " } else { "│  " };
            println!("   {} {} ({})", tree_prefix(i, info.sinks.len()), sink.name, sink.sink_type);
            for (j, (key, value)) in sink.params.iter().enumerate() {
                println!(
                    "   {}  {} {} = {}",
                    child_prefix,
                    tree_prefix(j, sink.params.len()),
                    key,
                    value
                );
            }
        }
    }

    if let Some(ref categories) = info.categories {
        for (kind, levels) in [("Runner", &categories.runner), ("Croner", &categories.croner)] {
            println!("\n🏷  {} Categories ({})", kind, levels.len());
            for (i, (class, level)) in levels.iter().enumerate() {
                println!("   {} {}: {:?}", tree_prefix(i, levels.len()), class, level);
            }
        }
    }

    println!();
}
