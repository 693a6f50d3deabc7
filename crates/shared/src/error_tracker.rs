use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::error;

/// Sentinel subject for failures of the AI summarization call itself.
pub const AI_BATCH_PROCESSING: &str = "AI_BATCH_PROCESSING";

const RECENT_ERRORS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub subject: String,
    pub kind: String,
    pub message: String,
    pub timestamp: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub error_kinds: BTreeMap<String, usize>,
    pub recent_errors: Vec<ErrorEntry>,
}

#[derive(Default)]
struct Backlog {
    entries: Vec<ErrorEntry>,
    counts: BTreeMap<String, usize>,
}

/// Backlog of processing failures kept for reporting after a run.
#[derive(Default)]
pub struct ErrorTracker {
    backlog: Mutex<Backlog>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self, subject: &str, kind: &str, message: impl std::fmt::Display) {
        let entry = ErrorEntry {
            subject: subject.to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
            retry_count: 0,
        };
        error!("Recorded error for '{}': {}", entry.subject, entry.message);

        let mut backlog = self.lock();
        *backlog.counts.entry(entry.kind.clone()).or_insert(0) += 1;
        backlog.entries.push(entry);
    }

    pub fn backlog(&self) -> Vec<ErrorEntry> {
        self.lock().entries.clone()
    }

    pub fn stats(&self) -> ErrorStats {
        let backlog = self.lock();
        let skip = backlog.entries.len().saturating_sub(RECENT_ERRORS);
        ErrorStats {
            total_errors: backlog.entries.len(),
            error_kinds: backlog.counts.clone(),
            recent_errors: backlog.entries[skip..].to_vec(),
        }
    }

    pub fn clear(&self) {
        let mut backlog = self.lock();
        backlog.entries.clear();
        backlog.counts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    // A poisoned lock still holds a usable backlog.
    fn lock(&self) -> std::sync::MutexGuard<'_, Backlog> {
        self.backlog.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
