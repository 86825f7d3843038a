//! Synchronizer that records calls instead of talking to a transport.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::Synchronizer;
use keyvault_common::{Error, Result};

/// Counts sync calls. Useful for testing and development.
///
/// Failures can be injected to exercise error paths of callers.
#[derive(Debug, Default)]
pub struct RecordingSynchronizer {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl RecordingSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sync calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` sync calls fail with a network error.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Synchronizer for RecordingSynchronizer {
    async fn sync(&self) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        debug!(call, failing, "Sync requested");
        if failing {
            return Err(Error::Network("Injected sync failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_calls_and_injects_failures() {
        let sync = RecordingSynchronizer::new();
        sync.fail_next(1);

        assert!(matches!(sync.sync().await, Err(Error::Network(_))));
        assert!(sync.sync().await.is_ok());
        assert_eq!(sync.calls(), 2);
    }
}
