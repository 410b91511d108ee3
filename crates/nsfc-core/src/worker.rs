//! Fixed-size worker pool draining one bounded update queue.
//!
//! Any worker may take any update, so ordering across updates (even within a
//! chat) is not preserved.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{pipeline::Pipeline, update::InboundUpdate};

pub type UpdateSender = mpsc::Sender<InboundUpdate>;
pub type UpdateReceiver = mpsc::Receiver<InboundUpdate>;

/// Bounded queue: producers wait when workers fall behind.
pub fn update_queue(capacity: usize) -> (UpdateSender, UpdateReceiver) {
    mpsc::channel(capacity.max(1))
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `workers` tasks that run `pipeline` on every queued update.
    ///
    /// Workers exit when `cancel` fires or when every sender is dropped and
    /// the queue is drained.
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        rx: UpdateReceiver,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    pipeline.clone(),
                    rx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        Self { handles, cancel }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    pipeline: Arc<Pipeline>,
    rx: Arc<Mutex<UpdateReceiver>>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "worker started");
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                upd = rx.recv() => upd,
            }
        };
        let Some(raw) = next else {
            break;
        };

        // Run each update in its own task so a panicking handler costs one
        // update, not the worker.
        let pipeline = pipeline.clone();
        let res = tokio::spawn(async move { pipeline.handle(raw).await }).await;
        match res {
            Ok(outcome) => debug!(worker = id, ?outcome, "update processed"),
            Err(e) => error!(worker = id, error = %e, "update handler panicked"),
        }
    }
    debug!(worker = id, "worker stopped");
}

/// Sweep stale replies on a fixed interval until cancelled.
///
/// Complements the sweep that runs on every new command.
pub fn spawn_periodic_sweep(
    pipeline: Arc<Pipeline>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval = ?every, "periodic reply sweep enabled");
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    pipeline
                        .registry()
                        .sweep(Utc::now(), pipeline.messenger().as_ref())
                        .await;
                }
            }
        }
    })
}
