use std::sync::Arc;
use std::time::Instant;

use fastcopy_core::storage::StorageGateway;
use futures::future::join_all;
use metrics::{histogram, increment_counter};
use tokio::runtime::Handle;
use tracing::{error, info, instrument, Instrument};
use url::Url;

use crate::copy::{
    channel, ConcurrencyLimiter, CopyError, Relay, TransferRequest, TransferSummary, TransferTask,
};
use crate::metrics::{COUNTER_COPY_REQUESTS, HISTOGRAM_COPY_ELAPSED};

/// Coordinates copy runs: lists, fans out bounded transfer tasks, joins and summarizes.
#[derive(Clone)]
pub struct Orchestrator {
    gateway: StorageGateway,
    relay: Arc<dyn Relay>,
    limiter: ConcurrencyLimiter,
    /// Runtime transfer tasks are spawned on.
    runtime: Handle,
    default_target: Option<Url>,
}

impl Orchestrator {
    pub fn new(
        gateway: StorageGateway,
        relay: Arc<dyn Relay>,
        limiter: ConcurrencyLimiter,
        runtime: Handle,
    ) -> Self {
        Self {
            gateway,
            relay,
            limiter,
            runtime,
            default_target: None,
        }
    }

    /// Ingress sink used when a request names none.
    #[must_use]
    pub fn with_default_target(mut self, target: Option<Url>) -> Self {
        self.default_target = target;
        self
    }

    pub const fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Validate raw request parameters against this orchestrator's defaults.
    ///
    /// # Errors
    /// Returns `CopyError::Validation` if a parameter is missing or malformed.
    pub fn prepare(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        target: Option<&str>,
    ) -> Result<TransferRequest, CopyError> {
        TransferRequest::new(from, to, target, self.default_target.as_ref())
    }

    /// Copy every file directly under the source directory.
    ///
    /// Per-file failures are recorded in the summary and never abort sibling transfers.
    /// Dropping the returned future does not cancel transfers already spawned.
    ///
    /// # Errors
    /// Returns `CopyError::Listing` if the source directory can't be listed. No transfer is
    /// started in that case.
    #[instrument(skip_all, fields(from = %request.source_dir, to = %request.dest_dir))]
    pub async fn run(&self, request: &TransferRequest) -> Result<TransferSummary, CopyError> {
        increment_counter!(COUNTER_COPY_REQUESTS);
        let started = Instant::now();

        let entries = self
            .gateway
            .list_dir(&request.source_dir)
            .await
            .map_err(|source| CopyError::Listing {
                dir: request.source_dir.clone(),
                source,
            })?;
        let files: Vec<_> = entries.into_iter().filter(|entry| !entry.is_dir).collect();
        let files_requested = files.len() as u64;
        info!(files_requested, target = %request.dest_endpoint, "listed source directory");

        let dest_dir: Arc<str> = Arc::from(request.dest_dir.as_str());
        let target = Arc::new(request.dest_endpoint.clone());
        let (tx, aggregator) = channel();
        let handles: Vec<_> = files
            .into_iter()
            .map(|entry| {
                let reporter = tx.reporter(&entry.path, entry.size);
                let task = TransferTask {
                    entry,
                    dest_dir: dest_dir.clone(),
                    target: target.clone(),
                    gateway: self.gateway.clone(),
                    relay: self.relay.clone(),
                    limiter: self.limiter.clone(),
                };
                self.runtime.spawn(task.run(reporter).in_current_span())
            })
            .collect();
        // Aggregation ends once the last reporter is gone.
        drop(tx);

        let (joined, totals) = tokio::join!(join_all(handles), aggregator.collect());
        for res in joined {
            if let Err(e) = res {
                error!(%e, "transfer task did not complete");
            }
        }
        let elapsed = started.elapsed();
        debug_assert_eq!(totals.files_copied + totals.files_failed(), files_requested);

        let summary = TransferSummary::new(request, files_requested, totals, elapsed);
        histogram!(HISTOGRAM_COPY_ELAPSED, summary.elapsed_secs);
        info!(
            written = summary.written,
            files_requested = summary.files_requested,
            files_copied = summary.files_copied,
            files_failed = summary.copy_failures.len(),
            throughput_mbps = summary.throughput_mbps,
            elapsed_secs = summary.elapsed_secs,
            "copy finished"
        );
        Ok(summary)
    }
}
