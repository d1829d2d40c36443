use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{JobQueue, ReservedJob};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type Handler = Arc<dyn Fn(ReservedJob) -> HandlerFuture + Send + Sync>;

/// Drives N tokio tasks per job kind, each looping reserve -> run handler ->
/// ack/fail (§4.I "document parsing: 2 concurrent workers", §9 "workers are
/// independent and stateless"). Modeled on
/// `SchedulerEngine::run`'s `tokio::select!` between a poll interval and a
/// `watch::Receiver<bool>` shutdown signal.
pub struct JobWorkerPool {
    queue: Arc<dyn JobQueue>,
    poll_interval: StdDuration,
}

impl JobWorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            poll_interval: StdDuration::from_millis(500),
        }
    }

    /// Spawns `concurrency` worker tasks for `kind`, each running `handler`
    /// on every reserved job. Returns immediately; tasks run until
    /// `shutdown` broadcasts `true`.
    pub fn spawn<F, Fut>(
        &self,
        kind: &'static str,
        concurrency: usize,
        handler: F,
        shutdown: watch::Receiver<bool>,
    ) where
        F: Fn(ReservedJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |job| Box::pin(handler(job)));
        for worker_idx in 0..concurrency {
            let queue = self.queue.clone();
            let handler = handler.clone();
            let poll_interval = self.poll_interval;
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                info!(%kind, worker_idx, "job worker started");
                let mut interval = tokio::time::interval(poll_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            match queue.reserve(kind).await {
                                Ok(Some(job)) => {
                                    let id = job.id.clone();
                                    match handler(job).await {
                                        Ok(()) => {
                                            if let Err(e) = queue.ack(&id).await {
                                                error!(job_id = %id, "ack failed: {e}");
                                            }
                                        }
                                        Err(msg) => {
                                            warn!(job_id = %id, error = %msg, "job handler failed");
                                            if let Err(e) = queue.fail(&id, &msg).await {
                                                error!(job_id = %id, "fail() bookkeeping failed: {e}");
                                            }
                                        }
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => error!(%kind, "reserve failed: {e}"),
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!(%kind, worker_idx, "job worker shutting down");
                                break;
                            }
                        }
                    }
                }
            });
        }
    }
}
