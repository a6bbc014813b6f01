use std::sync::Arc;

use fastcopy_core::storage::{FileEntry, StorageGateway};
use metrics::{counter, decrement_gauge, increment_counter, increment_gauge};
use scopeguard::defer;
use tracing::{debug, info, warn};
use url::Url;

use crate::copy::{
    ConcurrencyLimiter, OutcomeReporter, Relay, TransferError, TransferFailure, TransferOutcome,
};
use crate::metrics::{
    COUNTER_COPY_BYTES_WRITTEN, COUNTER_COPY_FILES_COPIED, COUNTER_COPY_FILES_FAILED,
    GAUGE_TRANSFERS_ACTIVE,
};

/// Transfer of one source file to the ingress sink.
pub struct TransferTask {
    pub entry: FileEntry,
    pub dest_dir: Arc<str>,
    pub target: Arc<Url>,
    pub gateway: StorageGateway,
    pub relay: Arc<dyn Relay>,
    pub limiter: ConcurrencyLimiter,
}

impl TransferTask {
    /// Run the transfer and report its outcome.
    pub async fn run(self, reporter: OutcomeReporter) {
        debug!(path = reporter.path(), size = reporter.size(), "transfer task queued");
        let outcome = self.transfer().await;
        match &outcome {
            TransferOutcome::Success { bytes_written, .. } => {
                increment_counter!(COUNTER_COPY_FILES_COPIED);
                counter!(COUNTER_COPY_BYTES_WRITTEN, *bytes_written);
            }
            TransferOutcome::Failure(_) => increment_counter!(COUNTER_COPY_FILES_FAILED),
        }
        reporter.report(outcome);
    }

    /// Produce the outcome of this transfer. Never fails; errors become `Failure`s.
    pub async fn transfer(&self) -> TransferOutcome {
        let entry = &self.entry;
        let result = match self.limiter.acquire().await {
            Ok(_permit) => {
                increment_gauge!(GAUGE_TRANSFERS_ACTIVE, 1.0);
                debug!(path = %entry.path, active = self.limiter.active(), "permit acquired");
                defer! {
                    decrement_gauge!(GAUGE_TRANSFERS_ACTIVE, 1.0);
                }
                self.copy().await
            }
            Err(_) => Err(TransferError::Aborted),
        };

        match result {
            Ok(bytes_written) => {
                info!(path = %entry.path, bytes_written, "file copied to target");
                TransferOutcome::Success {
                    path: entry.path.clone(),
                    bytes_written,
                }
            }
            Err(e) => {
                warn!(path = %entry.path, size = entry.size, error = %e, "failed to copy file");
                TransferOutcome::Failure(TransferFailure {
                    path: entry.path.clone(),
                    reason: e.to_string(),
                    size: entry.size,
                })
            }
        }
    }

    async fn copy(&self) -> Result<u64, TransferError> {
        let entry = &self.entry;
        debug!(path = %entry.path, size = entry.size, "reading source file");

        // The stream is moved into the request body and closed with it, on every exit path.
        let stream = self
            .gateway
            .open_read(&entry.path)
            .await
            .map_err(TransferError::Open)?;
        let written = self
            .relay
            .relay(&self.target, &self.dest_dir, &entry.name, entry.size, stream)
            .await?;

        if written != entry.size {
            warn!(
                path = %entry.path,
                listed = entry.size,
                written,
                "ingress sink reported a different byte count than listed"
            );
        }
        Ok(entry.size)
    }
}
