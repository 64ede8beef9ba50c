//! Per-request mutual exclusion for mutating operations.

use crate::error::{RegulationError, RegulationResult};
use regulacao_uuid::RequestId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of one async mutex per request id.
///
/// A mutating operation holds the guard across its whole fetch, validate and persist sequence.
/// Waiting is bounded; a caller that cannot get the lock in time receives
/// [`RegulationError::Conflict`] and should retry with fresh data.
#[derive(Debug, Default)]
pub struct RequestLocks {
    locks: Mutex<HashMap<RequestId, Arc<AsyncMutex<()>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        id: RequestId,
        timeout: Duration,
    ) -> RegulationResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Entries only referenced by the map have no holder and no waiter.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id).or_default().clone()
        };

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%id, "timed out waiting for request lock");
                RegulationError::Conflict(format!(
                    "request {id} is being modified by another operation"
                ))
            })
    }

    /// Number of ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
