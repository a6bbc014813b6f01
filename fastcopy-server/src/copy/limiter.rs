use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Fixed capacity permit pool capping the number of active transfer tasks.
///
/// Shared by every copy request of the process. Permits are released when dropped.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free permit. Acquisition order is unspecified.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore.clone().acquire_owned().await
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently held.
    pub fn active(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}
