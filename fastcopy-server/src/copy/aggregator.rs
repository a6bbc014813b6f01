use tokio::sync::mpsc;
use tracing::warn;

use crate::copy::{TransferError, TransferFailure, TransferOutcome};

/// Running totals of a copy run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Totals {
    /// Sum of sizes of copied files. Failed files never contribute.
    pub bytes_written: u64,
    pub files_copied: u64,
    pub failures: Vec<TransferFailure>,
}

impl Totals {
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Success { bytes_written, .. } => {
                self.bytes_written += bytes_written;
                self.files_copied += 1;
            }
            TransferOutcome::Failure(failure) => self.failures.push(failure),
        }
    }

    pub fn files_failed(&self) -> u64 {
        self.failures.len() as u64
    }
}

/// Create an outcome channel and the aggregator folding it.
pub fn channel() -> (OutcomeSender, Aggregator) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutcomeSender(tx), Aggregator { rx })
}

/// Single consumer of all task outcomes.
pub struct Aggregator {
    rx: mpsc::UnboundedReceiver<TransferOutcome>,
}

impl Aggregator {
    /// Fold outcomes until every sender and reporter is gone.
    pub async fn collect(mut self) -> Totals {
        let mut totals = Totals::default();
        while let Some(outcome) = self.rx.recv().await {
            totals.record(outcome);
        }
        totals
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeSender(mpsc::UnboundedSender<TransferOutcome>);

impl OutcomeSender {
    /// Reporter for one file. It reports exactly one outcome.
    pub fn reporter(&self, path: &str, size: u64) -> OutcomeReporter {
        OutcomeReporter {
            tx: Some(self.0.clone()),
            path: path.to_string(),
            size,
        }
    }
}

/// Reports the outcome of one transfer task.
///
/// If dropped before reporting, e.g. when the task panics or is cancelled, a failure is
/// reported instead so every file is accounted for.
pub struct OutcomeReporter {
    tx: Option<mpsc::UnboundedSender<TransferOutcome>>,
    path: String,
    size: u64,
}

impl OutcomeReporter {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    pub fn report(mut self, outcome: TransferOutcome) {
        if let Some(tx) = self.tx.take() {
            // Receiver only goes away if the orchestrator itself was dropped.
            drop(tx.send(outcome));
        }
    }
}

impl Drop for OutcomeReporter {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(path = %self.path, "transfer task dropped without an outcome");
            drop(tx.send(TransferOutcome::Failure(TransferFailure {
                path: std::mem::take(&mut self.path),
                reason: TransferError::Aborted.to_string(),
                size: self.size,
            })));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::copy::{TransferFailure, TransferOutcome};

    use super::channel;

    fn failure(path: &str, size: u64) -> TransferOutcome {
        TransferOutcome::Failure(TransferFailure {
            path: path.to_string(),
            reason: "rejected".to_string(),
            size,
        })
    }

    fn success(path: &str, bytes_written: u64) -> TransferOutcome {
        TransferOutcome::Success {
            path: path.to_string(),
            bytes_written,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn must_fold_concurrent_outcomes() {
        let (tx, aggregator) = channel();
        let collector = tokio::spawn(aggregator.collect());

        let handles: Vec<_> = (0..100u64)
            .map(|i| {
                let reporter = tx.reporter(&format!("/in/{i}"), i);
                tokio::spawn(async move {
                    let outcome = if i % 10 == 3 {
                        failure(reporter.path(), reporter.size())
                    } else {
                        success(reporter.path(), reporter.size())
                    };
                    reporter.report(outcome);
                })
            })
            .collect();
        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }

        let totals = collector.await.unwrap();
        let failed_bytes: u64 = (0..100u64).filter(|i| i % 10 == 3).sum();
        assert_eq!(totals.files_copied, 90);
        assert_eq!(totals.files_failed(), 10);
        assert_eq!(totals.bytes_written, (0..100u64).sum::<u64>() - failed_bytes);
    }

    #[tokio::test]
    async fn must_report_failure_when_dropped() {
        let (tx, aggregator) = channel();
        let reporter = tx.reporter("/in/a", 42);
        let handle = tokio::spawn(async move {
            let _reporter = reporter;
            panic!("task blew up");
        });
        assert!(handle.await.unwrap_err().is_panic());
        drop(tx);

        let totals = aggregator.collect().await;
        assert_eq!(totals.files_copied, 0);
        assert_eq!(totals.bytes_written, 0);
        assert_eq!(totals.failures.len(), 1);
        assert_eq!(totals.failures[0].path, "/in/a");
        assert_eq!(totals.failures[0].size, 42);
    }

    #[tokio::test]
    async fn must_count_each_reporter_once() {
        let (tx, aggregator) = channel();
        tx.reporter("/in/a", 1).report(success("/in/a", 1));
        tx.reporter("/in/b", 2).report(failure("/in/b", 2));
        drop(tx);

        let totals = aggregator.collect().await;
        assert_eq!(totals.files_copied, 1);
        assert_eq!(totals.files_failed(), 1);
        assert_eq!(totals.bytes_written, 1);
    }
}
