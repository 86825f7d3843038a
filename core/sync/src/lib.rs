//! Keyvault Sync
//!
//! Pushes pending local changes after vault operations commit:
//! - `Synchronizer` trait consumed by the vault manager
//! - Scheduler and worker with manual, on-demand and periodic modes
//! - Exponential backoff for transient push failures
//! - Recording synchronizer for tests and development

pub mod config;
pub mod memory;
pub mod retry;
pub mod scheduler;

use async_trait::async_trait;
use keyvault_common::Result;

pub use config::SyncConfig;
pub use memory::RecordingSynchronizer;
pub use retry::{is_transient, with_backoff, Backoff};
pub use scheduler::{SyncMode, SyncReport, SyncScheduler, SyncWorker};

/// Persists pending changes to the sync transport.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Push everything that is pending. Resolves once the push finished.
    async fn sync(&self) -> Result<()>;
}
