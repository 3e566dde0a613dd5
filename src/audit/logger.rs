//! Audit log writer: append-only JSONL file.
//!
//! One JSON object per line, flushed after every write. `AuditSink` is the
//! request-path handle: it stamps records and writes them on tokio's blocking
//! pool so a slow disk never stalls a runtime worker.

use crate::audit::types::{AuditEvent, AuditRecord};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

pub struct AuditLogger {
    log_path: PathBuf,
    file: File,
    entry_count: usize,
}

impl AuditLogger {
    /// Open (or create) the log file, creating parent directories.
    pub fn with_path(path: impl AsRef<Path>) -> Result<Self> {
        let log_path = path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create audit directory: {}", parent.display())
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open audit log: {}", log_path.display()))?;

        Ok(Self {
            log_path,
            file,
            entry_count: 0,
        })
    }

    pub fn log(&mut self, record: &AuditRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize audit record")?;
        writeln!(self.file, "{}", json).context("Failed to write audit record")?;
        self.file.flush().context("Failed to flush audit log")?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }
}

#[derive(Clone)]
pub struct AuditSink {
    who: String,
    logger: Arc<Mutex<AuditLogger>>,
}

impl AuditSink {
    pub fn new(who: impl Into<String>, logger: AuditLogger) -> Self {
        Self {
            who: who.into(),
            logger: Arc::new(Mutex::new(logger)),
        }
    }

    pub fn open(who: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(who, AuditLogger::with_path(path)?))
    }

    pub fn stamp(&self, event: AuditEvent, started: Instant) -> AuditRecord {
        AuditRecord {
            time: Utc::now(),
            who: self.who.clone(),
            referrer: event.referrer,
            action: event.action,
            success: event.success,
            duration: started.elapsed().as_secs_f64(),
            url: event.url,
            domain: event.domain,
            source: event.source,
            store: event.store,
            desc: event.desc,
        }
    }

    /// Write the record on the blocking pool. Failures are logged, never
    /// returned to the request.
    pub fn emit(&self, event: AuditEvent, started: Instant) -> JoinHandle<()> {
        let record = self.stamp(event, started);
        let logger = self.logger.clone();
        tokio::task::spawn_blocking(move || {
            let mut logger = logger.blocking_lock();
            if let Err(e) = logger.log(&record) {
                warn!("failed to write audit record for {}: {:#}", record.url, e);
            }
        })
    }

    pub async fn entry_count(&self) -> usize {
        self.logger.lock().await.entry_count()
    }
}
