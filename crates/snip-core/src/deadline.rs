use crate::error::StorageError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Per-request cancellation handle threaded through every backend call.
///
/// Backends call [`Deadline::check`] before starting work and wrap their
/// suspension points (lock acquisition, connection acquisition, queries) in
/// [`Deadline::run`]. Work that has already committed a mutation must not be
/// wrapped, so a firing deadline never leaves a partially applied mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Fails with [`StorageError::Canceled`] once the deadline has passed.
    pub fn check(&self) -> Result<(), StorageError> {
        if self.is_expired() {
            return Err(StorageError::Canceled);
        }
        Ok(())
    }

    /// Drives `future` to completion unless the deadline fires first.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, StorageError>
    where
        F: Future,
    {
        self.check()?;
        tokio::time::timeout_at(self.at, future)
            .await
            .map_err(|_| StorageError::Canceled)
    }
}
