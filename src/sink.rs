use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::types::ClassifiedResult;

/// Receives each classified result as soon as it is produced.
///
/// Called concurrently from probe tasks; implementations must not fail the scan
/// and must not block the runtime.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn emit(&self, result: &ClassifiedResult);
}

/// Append-only list of `host:port` endpoints with players online.
///
/// Each entry is written newline-prefixed. Write failures are logged and ignored.
#[derive(Debug)]
pub struct ResultFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResultFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `result` if anyone is online. Returns whether a line was written.
    pub async fn append(&self, result: &ClassifiedResult) -> bool {
        if result.status.online_players == 0 {
            return false;
        }
        let line = format!("\n{}", result.endpoint());
        let _guard = self.lock.lock().await;
        let written = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        match written {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), endpoint = %result.endpoint(), "failed to append result: {e}");
                false
            }
        }
    }
}

/// Console line per result plus an optional result file.
#[derive(Debug, Default)]
pub struct Reporter {
    pub console: bool,
    pub result_file: Option<ResultFile>,
}

#[async_trait]
impl ResultSink for Reporter {
    async fn emit(&self, result: &ClassifiedResult) {
        if self.console {
            println!("{result}");
        }
        if let Some(file) = &self.result_file {
            file.append(result).await;
        }
    }
}

/// Write every result as pretty JSON to `path`.
pub fn write_results_json(path: &Path, results: &[ClassifiedResult]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
