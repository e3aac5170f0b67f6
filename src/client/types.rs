use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque job handle returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub batch_id: BatchId,
    #[serde(default)]
    pub status: Option<String>,
}

/// Job status as reported by the service. Unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => Self::Queued,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(s: JobStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome breakdown. Only meaningful once the job has completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counts {
    pub auto_matched: u64,
    pub needs_review: u64,
    pub unmatched: u64,
    pub confirmed: u64,
    pub external: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    pub status: JobStatus,
    #[serde(default)]
    pub processed_count: u64,
    /// Unknown until the service has counted the input rows.
    #[serde(default)]
    pub total_transactions: Option<u64>,
    #[serde(default)]
    pub counts: Option<Counts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
}

impl StatusSnapshot {
    pub fn new(status: JobStatus, processed_count: u64, total_transactions: Option<u64>) -> Self {
        Self {
            batch_id: None,
            status,
            processed_count,
            total_transactions,
            counts: None,
            progress_percent: None,
        }
    }

    pub fn with_counts(mut self, counts: Counts) -> Self {
        self.counts = Some(counts);
        self
    }
}

/// Read endpoints sampled by the latency probers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEndpoint {
    InvoiceSearch,
    BatchTransactions(BatchId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryTiming {
    pub items: usize,
    pub elapsed: Duration,
}

/// `{items: [...]}` page; only the length is of interest. The service sends
/// `null` for an empty page.
#[derive(Debug, Deserialize)]
pub(crate) struct ItemsPage {
    #[serde(default)]
    items: Option<Vec<IgnoredAny>>,
}

impl ItemsPage {
    pub(crate) fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }
}
