//! Per-process concurrency limits with bounded queueing.

use rambla_core::{AgentError, AgentResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Caps in-flight operations of one kind (model calls, tool calls). Excess
/// callers queue up to a bounded length; beyond that the limiter fails fast
/// with `OVERLOADED` instead of letting latency pile up invisibly.
pub struct ConcurrencyLimiter {
    resource: &'static str,
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
    max_queued: usize,
}

/// Held for the duration of the limited operation.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(resource: &'static str, max_active: usize, max_queued: usize) -> Self {
        Self {
            resource,
            semaphore: Arc::new(Semaphore::new(max_active.max(1))),
            queued: AtomicUsize::new(0),
            max_queued,
        }
    }

    /// Acquire a slot, queueing if the limit is reached.
    pub async fn acquire(&self) -> AgentResult<LimiterPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(LimiterPermit { _permit: permit }),
            Err(TryAcquireError::Closed) => Err(self.overloaded()),
            Err(TryAcquireError::NoPermits) => {
                let waiting = self.queued.fetch_add(1, Ordering::SeqCst);
                if waiting >= self.max_queued {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    tracing::warn!(resource = self.resource, waiting, "limiter queue full");
                    return Err(self.overloaded());
                }
                let result = self.semaphore.clone().acquire_owned().await;
                self.queued.fetch_sub(1, Ordering::SeqCst);
                result
                    .map(|permit| LimiterPermit { _permit: permit })
                    .map_err(|_| self.overloaded())
            }
        }
    }

    /// Slots currently available.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn overloaded(&self) -> AgentError {
        AgentError::Overloaded { resource: self.resource.to_string() }
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("resource", &self.resource)
            .field("available", &self.available())
            .field("max_queued", &self.max_queued)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
