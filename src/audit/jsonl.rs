use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::errors::ConductorError;
use super::tracer::{TraceEvent, Tracer};

/// Appends one JSON line per event to `<dir>/trace-YYYYMMDD.jsonl`.
pub struct JsonlTracer {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlTracer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File events logged now are appended to.
    pub fn current_file(&self) -> PathBuf {
        self.dir.join(format!("trace-{}.jsonl", Utc::now().format("%Y%m%d")))
    }
}

#[async_trait]
impl Tracer for JsonlTracer {
    async fn log_execution(
        &self,
        name: &str,
        input: &Value,
        output: &Value,
        metadata: &Map<String, Value>,
        trace_id: Option<&str>,
    ) -> Result<Option<String>, ConductorError> {
        let event = TraceEvent::new(name, input, output, metadata, trace_id);
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_file())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(Some(event.trace_id))
    }
}
