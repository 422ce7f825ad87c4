//! JSONL audit trail - append-only writer with daily rotation

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{NotifyError, NotifyResult};
use crate::event::AuditRecord;
use crate::traits::AuditSink;

/// Append-only JSONL audit sink
///
/// One file per day, named `YYYY-MM-DD.jsonl`, one record per line.
/// Records are flushed as they arrive so a crash loses at most the
/// record being written.
pub struct JsonlAuditSink {
    base_path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
}

impl JsonlAuditSink {
    /// Create a new audit sink writing under the given directory
    pub fn new(base_path: impl AsRef<Path>) -> NotifyResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        Ok(Self {
            base_path,
            inner: Mutex::new(Inner {
                current_file: None,
                current_date: None,
            }),
        })
    }

    /// Append one record, rotating the file when the date changes
    pub fn append(&self, record: &AuditRecord) -> NotifyResult<()> {
        let date = record.at.format("%Y-%m-%d").to_string();
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NotifyError::Internal("audit writer lock poisoned".into()))?;

        if inner.current_date.as_ref() != Some(&date) {
            inner.rotate_file(&self.base_path, &date)?;
        }

        if let Some(ref mut writer) = inner.current_file {
            let json = serde_json::to_string(record)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        Ok(())
    }

    /// Get the path to today's file
    pub fn today_file_path(&self) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        self.base_path.join(format!("{}.jsonl", date))
    }

    /// List all JSONL files in the trail
    pub fn list_files(&self) -> NotifyResult<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "jsonl") {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Flush and close the current file
    pub fn close(&self) -> NotifyResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NotifyError::Internal("audit writer lock poisoned".into()))?;
        if let Some(ref mut writer) = inner.current_file {
            writer.flush()?;
        }
        inner.current_file = None;
        inner.current_date = None;
        Ok(())
    }
}

impl Inner {
    /// Rotate to a new file for the given date
    fn rotate_file(&mut self, base_path: &Path, date: &str) -> NotifyResult<()> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }

        let file_path = base_path.join(format!("{}.jsonl", date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        self.current_file = Some(BufWriter::new(file));
        self.current_date = Some(date.to_string());

        Ok(())
    }
}

impl Drop for JsonlAuditSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn record(&self, record: &AuditRecord) -> NotifyResult<()> {
        self.append(record)
    }
}
