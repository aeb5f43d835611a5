//! FileSink - appends records as JSON lines, partitioned by kind and day

use chrono::Utc;
use contracts::{ContractError, LogBatch, LogSink};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./task-logs"));

        Self { base_path }
    }
}

/// Sink that appends batches to `{base_path}/{kind}/{YYYY-MM-DD}.jsonl`
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    // Held for the whole append so concurrent batches never interleave lines
    created_dirs: Mutex<HashSet<PathBuf>>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: Mutex::new(HashSet::new()),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    fn write_batch_to_disk(&self, batch: &LogBatch) -> std::io::Result<PathBuf> {
        let dir = self.config.base_path.join(batch.kind().as_str());
        let path = dir.join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")));

        let mut created_dirs = self
            .created_dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !created_dirs.contains(&dir) {
            fs::create_dir_all(&dir)?;
            created_dirs.insert(dir);
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        match batch {
            LogBatch::Runner(records) => write_lines(&mut writer, records)?,
            LogBatch::Croner(records) => write_lines(&mut writer, records)?,
        }
        writer.flush()?;

        Ok(path)
    }
}

fn write_lines<W: Write, T: Serialize>(writer: &mut W, records: &[T]) -> std::io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut *writer, record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

impl LogSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_persist",
        skip(self, batch),
        fields(sink = %self.name, kind = %batch.kind(), records = batch.len())
    )]
    fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError> {
        match self.write_batch_to_disk(batch) {
            Ok(path) => {
                debug!(sink = %self.name, path = %path.display(), "Batch appended");
                Ok(())
            }
            Err(e) => {
                error!(sink = %self.name, kind = %batch.kind(), error = %e, "Write failed");
                Err(ContractError::sink_write(&self.name, e.to_string()))
            }
        }
    }
}
