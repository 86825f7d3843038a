//! Background sync worker.
//!
//! A [`SyncScheduler`] queues pushes for a single [`SyncWorker`] task, so
//! pushes never overlap. Depending on [`SyncMode`] the worker also pushes
//! after change notifications or on a fixed interval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::retry::{with_backoff, Backoff};
use crate::Synchronizer;
use keyvault_common::{Error, Result};

/// Pushes queued before the worker catches up.
const QUEUE_DEPTH: usize = 64;

/// When the worker pushes without an explicit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Never.
    Manual,
    /// After every [`SyncScheduler::notify_change`].
    OnDemand,
    /// Every `interval`.
    Periodic { interval: Duration },
}

/// Outcome of one push.
#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    /// Changes the transport accepted.
    pub pushed: usize,
    /// Time spent, retries included.
    pub elapsed: Duration,
}

type Reply = oneshot::Sender<Result<SyncReport>>;

enum Command {
    Push(Option<Reply>),
    Stop,
}

/// Queues pushes for the worker. Clones share one worker.
#[derive(Clone)]
pub struct SyncScheduler {
    commands: mpsc::Sender<Command>,
    mode: Arc<watch::Sender<SyncMode>>,
}

impl SyncScheduler {
    /// Create a scheduler and the worker serving it. Nothing is pushed
    /// until the worker is [run](SyncWorker::run).
    pub fn new(config: &SyncConfig) -> (Self, SyncWorker) {
        let (commands, inbox) = mpsc::channel(QUEUE_DEPTH);
        let (mode, mode_rx) = watch::channel(config.mode.clone());

        let scheduler = Self {
            commands,
            mode: Arc::new(mode),
        };
        let worker = SyncWorker {
            inbox,
            mode: mode_rx,
            backoff: config.backoff(),
        };
        (scheduler, worker)
    }

    /// Push now and wait for the outcome.
    ///
    /// # Errors
    /// - `Sync` if the worker is not running
    /// - The push's error once transient failures exhausted their retries
    pub async fn request_sync(&self) -> Result<SyncReport> {
        let (reply, outcome) = oneshot::channel();
        self.send(Command::Push(Some(reply))).await?;
        outcome
            .await
            .map_err(|_| Error::Sync("Sync worker dropped the request".to_string()))?
    }

    /// Announce a local change. Queues a push in `OnDemand` mode only.
    pub async fn notify_change(&self) -> Result<()> {
        let on_demand = *self.mode.borrow() == SyncMode::OnDemand;
        if !on_demand {
            debug!("Change notification ignored");
            return Ok(());
        }
        self.send(Command::Push(None)).await
    }

    /// Switch modes. A running worker picks the change up immediately.
    pub fn set_mode(&self, mode: SyncMode) {
        self.mode.send_replace(mode);
    }

    pub fn mode(&self) -> SyncMode {
        self.mode.borrow().clone()
    }

    /// Stop the worker once the pushes queued before this call are done.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Sync("Sync worker not running".to_string()))
    }
}

#[async_trait]
impl Synchronizer for SyncScheduler {
    async fn sync(&self) -> Result<()> {
        self.request_sync().await.map(|_| ())
    }
}

/// Runs the pushes queued by a [`SyncScheduler`].
pub struct SyncWorker {
    inbox: mpsc::Receiver<Command>,
    mode: watch::Receiver<SyncMode>,
    backoff: Backoff,
}

impl SyncWorker {
    /// Serve pushes until [`SyncScheduler::shutdown`] or until every
    /// scheduler is dropped.
    ///
    /// `push` sends pending changes to the transport and returns how many
    /// it sent.
    pub async fn run<F, Fut>(mut self, push: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<usize>> + Send,
    {
        let mut ticker = Self::ticker(&self.mode.borrow_and_update());
        info!("Sync worker started");

        loop {
            tokio::select! {
                command = self.inbox.recv() => match command {
                    Some(Command::Push(reply)) => {
                        let outcome = self.push_once(&push).await;
                        match reply {
                            Some(reply) => {
                                let _ = reply.send(outcome);
                            }
                            None => Self::report("change", &outcome),
                        }
                    }
                    Some(Command::Stop) | None => break,
                },
                Ok(()) = self.mode.changed() => {
                    let mode = self.mode.borrow_and_update().clone();
                    debug!(mode = ?mode, "Sync mode changed");
                    ticker = Self::ticker(&mode);
                }
                _ = Self::tick(&mut ticker) => {
                    let outcome = self.push_once(&push).await;
                    Self::report("interval", &outcome);
                }
            }
        }

        info!("Sync worker stopped");
    }

    async fn push_once<F, Fut>(&self, push: &F) -> Result<SyncReport>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<usize>>,
    {
        let started = Instant::now();
        let pushed = with_backoff(&self.backoff, push).await?;
        Ok(SyncReport {
            pushed,
            elapsed: started.elapsed(),
        })
    }

    fn report(trigger: &str, outcome: &Result<SyncReport>) {
        match outcome {
            Ok(report) => info!(trigger, pushed = report.pushed, elapsed = ?report.elapsed, "Sync pushed"),
            Err(e) => error!(trigger, error = %e, "Sync push failed"),
        }
    }

    fn ticker(mode: &SyncMode) -> Option<Interval> {
        match mode {
            SyncMode::Periodic { interval } if !interval.is_zero() => {
                let mut ticker = interval_at(Instant::now() + *interval, *interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            _ => None,
        }
    }

    async fn tick(ticker: &mut Option<Interval>) {
        match ticker {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
