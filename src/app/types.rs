use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::app::scope::CanonicalUrl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Extracted,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub url: CanonicalUrl,
    pub title: String,
    pub body_text: String,
    pub extracted_at: DateTime<Utc>,
    pub outcome: PageOutcome,
}

impl PageRecord {
    pub fn failed(url: CanonicalUrl, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        PageRecord {
            url,
            title: "error".to_string(),
            body_text: reason.clone(),
            extracted_at: Utc::now(),
            outcome: PageOutcome::Failed(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, PageOutcome::Extracted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub url: CanonicalUrl,
    pub title: String,
    pub h1: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub selected: usize,
    pub processed: usize,
    pub failed: usize,
    pub files: Vec<PathBuf>,
    pub unwritten: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Pending,
    Discovering,
    Discovered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    Status(String),
    Error(String),
    Discovered {
        url: CanonicalUrl,
        total: usize,
    },
    Plan {
        discovered: usize,
        selected: usize,
        limit: Option<usize>,
        eta_minutes: f64,
    },
    Extracted {
        url: CanonicalUrl,
        done: usize,
        of: usize,
    },
    Unretrieved {
        url: CanonicalUrl,
        reason: String,
    },
    ChunkWritten {
        path: PathBuf,
        size_kb: f64,
    },
    ChunkFailed {
        path: PathBuf,
        reason: String,
    },
    Finished(RunSummary),
}

pub type EventSink = UnboundedSender<CrawlEvent>;

pub fn send_status(tx: &EventSink, message: impl Into<String>) {
    let _ = tx.send(CrawlEvent::Status(message.into()));
}

pub fn send_error(tx: &EventSink, message: impl Into<String>) {
    let _ = tx.send(CrawlEvent::Error(message.into()));
}
