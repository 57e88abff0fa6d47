//! In-process broker and worker pool.
//!
//! Jobs go through an unbounded tokio channel whose receiver is shared by
//! the workers. A worker runs one job at a time and enqueues the successor
//! jobs the handler returns, so no task ever waits on a whole chain.
//! Each job runs in its own task: a handler that panics loses that job only.

use crate::PlasticomeError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[async_trait]
pub trait JobHandler<J: Send + 'static>: Send + Sync {
    /// Run one job; the returned jobs are enqueued as its successors
    async fn handle(&self, job: J) -> Vec<J>;
}

pub struct WorkerPool<J> {
    sender: mpsc::UnboundedSender<J>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

/// Jobs queued or running, with a wake-up for `drain`
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Start `workers` workers (at least one). Must be called within a tokio runtime.
    pub fn spawn(workers: usize, handler: Arc<dyn JobHandler<J>>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<J>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(Pending::default());

        let workers = (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let sender = sender.clone();
                let handler = handler.clone();
                let pending = pending.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };

                        let task = {
                            let handler = handler.clone();
                            tokio::spawn(async move { handler.handle(job).await })
                        };
                        let successors = match task.await {
                            Ok(successors) => successors,
                            Err(e) => {
                                error!(worker, error = %e, "Job handler aborted; job dropped");
                                Vec::new()
                            }
                        };
                        for next in successors {
                            pending.add();
                            if sender.send(next).is_err() {
                                pending.done();
                                warn!(worker, "Queue closed; dropping successor job");
                            }
                        }
                        pending.done();
                    }
                    debug!(worker, "Worker stopped");
                })
            })
            .collect();

        Self {
            sender,
            workers,
            pending,
        }
    }

    pub fn enqueue(&self, job: J) -> Result<(), PlasticomeError> {
        self.pending.add();
        self.sender.send(job).map_err(|_| {
            self.pending.done();
            PlasticomeError::Pipeline("job queue is closed".to_string())
        })
    }

    /// Jobs queued or running
    pub fn in_flight(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Wait until no job is queued or running
    pub async fn drain(&self) {
        loop {
            let idle = self.pending.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl<J> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
