//! Background lane between the front door and the engine.
//!
//! Submission never blocks: jobs go onto an unbounded queue and the caller
//! returns immediately. A loop task pulls jobs off the queue and runs each
//! one on its own task, bounded by a semaphore, so a slow dispatch for one
//! account never holds up others.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::engine::{SafetyEngine, ScoringJob};

/// Default cap on concurrently processed events.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Background lane settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum events processed at the same time.
    pub max_in_flight: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Cloneable submission side of the lane.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<ScoringJob>,
}

impl WorkerHandle {
    /// Creates a handle and the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScoringJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a job. Returns false if the lane has shut down.
    pub fn submit(&self, job: ScoringJob) -> bool {
        match self.tx.send(job) {
            Ok(()) => true,
            Err(mpsc::error::SendError(job)) => {
                warn!(account_id = %job.account_id, "Background lane closed, event dropped");
                false
            }
        }
    }
}

/// Running background lane.
pub struct SafetyWorker {
    handle: WorkerHandle,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SafetyWorker {
    /// Starts the lane on the current tokio runtime.
    pub fn spawn(engine: Arc<SafetyEngine>, config: WorkerConfig) -> Self {
        let (handle, rx) = WorkerHandle::channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));

        info!(max_in_flight = config.max_in_flight, "Starting safety worker");
        let task = tokio::spawn(run(engine, rx, permits, shutdown_rx));

        Self {
            handle,
            shutdown,
            task,
        }
    }

    /// A handle for submitting jobs.
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stops accepting jobs, finishes everything already queued, and waits
    /// for in-flight jobs to complete.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Safety worker task failed: {}", e);
        }
        info!("Safety worker stopped");
    }
}

async fn run(
    engine: Arc<SafetyEngine>,
    mut rx: mpsc::UnboundedReceiver<ScoringJob>,
    permits: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tasks = JoinSet::new();

    loop {
        let job = tokio::select! {
            job = rx.recv() => job,
            _ = shutdown.changed() => {
                // Refuse new submissions; queued jobs still drain below.
                rx.close();
                rx.recv().await
            }
        };

        let Some(job) = job else { break };

        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };

        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            let _permit = permit;
            let account_id = job.account_id.clone();
            match engine.process(job).await {
                Ok(_) => debug!(account_id = %account_id, "Scoring event processed"),
                Err(e) => warn!(account_id = %account_id, "Scoring event failed: {}", e),
            }
        });

        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }
    }

    while let Some(result) = tasks.join_next().await {
        log_join(result);
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("Scoring task panicked: {}", e);
    }
}
