//! Bulk copy of one source directory to a remote ingress sink.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

pub use aggregator::{channel, OutcomeReporter, Totals};
pub use limiter::ConcurrencyLimiter;
pub use orchestrator::Orchestrator;
pub use relay::{HttpRelay, Relay};
pub use task::TransferTask;

mod aggregator;
mod limiter;
mod orchestrator;
mod relay;
mod task;

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

const MISSING_PARAMS: &str = "'from', 'to', and 'targetURL' query params must be provided.";

/// Input of one copy run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TransferRequest {
    pub source_dir: String,
    pub dest_dir: String,
    /// Ingress sink url, e.g. `http://bridge:8080/upload`.
    pub dest_endpoint: Url,
}

impl TransferRequest {
    /// Validate raw request parameters. Empty strings count as missing.
    ///
    /// `default_endpoint` is used when no target url is given.
    ///
    /// # Errors
    /// Returns `CopyError::Validation` if a parameter is missing or malformed.
    pub fn new(
        from: Option<&str>,
        to: Option<&str>,
        target: Option<&str>,
        default_endpoint: Option<&Url>,
    ) -> Result<Self, CopyError> {
        let (Some(from), Some(to)) = (non_empty(from), non_empty(to)) else {
            return Err(CopyError::Validation(MISSING_PARAMS.to_string()));
        };
        let dest_endpoint = match non_empty(target) {
            Some(target) => Url::parse(target)
                .map_err(|e| CopyError::Validation(format!("invalid targetURL '{target}': {e}")))?,
            None => default_endpoint
                .cloned()
                .ok_or_else(|| CopyError::Validation(MISSING_PARAMS.to_string()))?,
        };
        if !matches!(dest_endpoint.scheme(), "http" | "https") {
            return Err(CopyError::Validation(format!(
                "targetURL must be an http(s) url, got '{dest_endpoint}'"
            )));
        }
        Ok(Self {
            source_dir: from.to_string(),
            dest_dir: to.to_string(),
            dest_endpoint,
        })
    }
}

/// A file that could not be copied.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub path: String,
    pub reason: String,
    pub size: u64,
}

/// Result of one transfer task.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransferOutcome {
    Success { path: String, bytes_written: u64 },
    Failure(TransferFailure),
}

/// Final report of a copy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub from: String,
    pub to: String,
    pub written: u64,
    pub files_requested: u64,
    pub files_copied: u64,
    pub copy_failures: Vec<TransferFailure>,
    pub throughput_mbps: f64,
    pub elapsed_secs: f64,
}

impl TransferSummary {
    #[allow(clippy::cast_precision_loss)]
    pub fn new(
        request: &TransferRequest,
        files_requested: u64,
        totals: Totals,
        elapsed: Duration,
    ) -> Self {
        // Guard against a zero reading on coarse clocks.
        let elapsed_secs = elapsed.as_secs_f64().max(1e-9);
        Self {
            from: request.source_dir.clone(),
            to: request.dest_dir.clone(),
            written: totals.bytes_written,
            files_requested,
            files_copied: totals.files_copied,
            copy_failures: totals.failures,
            throughput_mbps: totals.bytes_written as f64 * 8.0 / elapsed_secs / 1_000_000.0,
            elapsed_secs,
        }
    }

    /// Whether every requested file was copied.
    pub fn is_complete(&self) -> bool {
        self.copy_failures.is_empty()
    }
}

/// Request level failure. No summary is produced.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("{0}")]
    Validation(String),
    #[error("failed to list source directory {dir}: {source}")]
    Listing {
        dir: String,
        #[source]
        source: opendal::Error,
    },
}

/// Reason a single file failed. Its `Display` is the reported reason.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to open source file: {0}")]
    Open(#[source] opendal::Error),
    #[error("failed to send file to ingress sink: {0}")]
    Send(#[source] reqwest::Error),
    #[error("ingress sink returned non-OK status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected ingress sink response: {0}")]
    Response(String),
    #[error("transfer task ended without reporting an outcome")]
    Aborted,
}
