//! Durable sinks for opportunities, executions, alerts and session records.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::controller::{SessionSummary, TradeRecord};
use crate::arbitrage::Opportunity;
use crate::error::Result;
use crate::risk::RiskAlert;
use crate::trading::ExecutionResult;

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    /// Detected opportunity.
    Opportunity(Opportunity),
    /// Execution result, failures included.
    Execution(ExecutionResult),
    /// Circuit breaker or fatal alert.
    RiskAlert(RiskAlert),
    /// Exported trade record.
    Trade(TradeRecord),
    /// End-of-session summary.
    Summary(SessionSummary),
}

impl JournalEntry {
    /// Event label.
    pub fn label(&self) -> &'static str {
        match self {
            JournalEntry::Opportunity(_) => "opportunity",
            JournalEntry::Execution(_) => "execution",
            JournalEntry::RiskAlert(_) => "risk_alert",
            JournalEntry::Trade(_) => "trade",
            JournalEntry::Summary(_) => "summary",
        }
    }
}

/// Storage collaborator.
#[async_trait]
pub trait JournalSink: Send + Sync {
    /// Persist one entry.
    async fn record(&self, entry: &JournalEntry) -> Result<()>;

    /// Flush buffered entries.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

#[async_trait]
impl JournalSink for NullJournal {
    async fn record(&self, _entry: &JournalEntry) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlJournal {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl JsonlJournal {
    /// Open `path` for appending, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// Journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl JournalSink for JsonlJournal {
    async fn record(&self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.file.lock().await.write_all(line.as_bytes()).await?;
        debug!(event = entry.label(), path = %self.path.display(), "Journaled");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.file.lock().await.flush().await?;
        Ok(())
    }
}

/// Keeps entries in memory; for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of entries with the given label.
    pub fn count(&self, label: &str) -> usize {
        self.entries().iter().filter(|e| e.label() == label).count()
    }
}

#[async_trait]
impl JournalSink for MemoryJournal {
    async fn record(&self, entry: &JournalEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::Severity;
    use tokio_test::assert_ok;

    fn alert() -> JournalEntry {
        JournalEntry::RiskAlert(RiskAlert::new("circuit_breaker", Severity::Critical, "3 losses"))
    }

    #[tokio::test]
    async fn jsonl_journal_appends_tagged_lines() {
        let path = std::env::temp_dir().join(format!("journal-{}.jsonl", uuid::Uuid::new_v4()));
        let journal = JsonlJournal::open(&path).await.unwrap();
        assert_ok!(journal.record(&alert()).await);
        assert_ok!(journal.record(&alert()).await);
        assert_ok!(journal.flush().await);

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["event"], "risk_alert");
        assert_eq!(value["severity"], "critical");

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn memory_journal_counts_by_label() {
        let journal = MemoryJournal::new();
        journal.record(&alert()).await.unwrap();
        assert_eq!(journal.count("risk_alert"), 1);
        assert_eq!(journal.count("trade"), 0);
        assert_ok!(NullJournal.record(&alert()).await);
    }
}
