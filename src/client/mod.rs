pub mod http;
pub mod types;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use types::{
    BatchId, Counts, JobStatus, QueryTiming, ReadEndpoint, StatusSnapshot, UploadAccepted,
};

/// The service's public HTTP boundary, as consumed by the harness.
///
/// No method retries; the only retry policy is the completion waiter's
/// polling loop.
pub trait Transport {
    fn health(&self) -> Result<(), TransportError>;
    fn upload(&self, input: &Path) -> Result<UploadAccepted, TransportError>;
    fn batch_status(&self, batch_id: &BatchId) -> Result<StatusSnapshot, TransportError>;
    /// Issues one timed read request. The elapsed time covers sending the
    /// request and reading the body, not building it or decoding the JSON.
    fn query(
        &self,
        endpoint: &ReadEndpoint,
        params: &[(String, String)],
    ) -> Result<QueryTiming, TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http client setup failed: {0}")]
    Client(String),
    #[error("request to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("reading upload input {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// HTTP status code, when the server answered with an unexpected one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
