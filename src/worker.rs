//! Bounded background worker pool.
//!
//! A fixed number of tokio tasks drain a bounded queue of jobs. The pool is
//! owned by the embedding process's lifecycle: create it at startup, hand
//! clones to whoever submits work, and call [`WorkerPool::shutdown`] during
//! teardown — it closes the queue and waits for in-flight jobs to finish.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("worker pool is shut down")]
    Closed,
    #[error("worker queue is full")]
    Full,
}

#[derive(Clone)]
pub struct WorkerPool {
    sender: Arc<Mutex<Option<mpsc::Sender<Job>>>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks draining a queue of at most `queue_capacity`
    /// pending jobs.
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let receiver = Arc::clone(&receiver);
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(job) = job else {
                        debug!(worker_id, "worker pool queue closed, exiting");
                        break;
                    };
                    job();
                }
            }));
        }

        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            handles: Arc::new(Mutex::new(handles)),
        }
    }

    /// Enqueue a job. Refuses once the pool is shut down or the queue is at
    /// capacity; callers decide whether that is fatal.
    pub fn submit<F>(&self, job: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().expect("worker pool lock poisoned");
        let Some(sender) = sender.as_ref() else {
            return Err(SubmitError::Closed);
        };
        sender.try_send(Box::new(job)).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Close the queue and wait for every in-flight and queued job.
    pub async fn shutdown(&self) {
        // Dropping the sender ends the workers' recv loops once the queue
        // drains; clones of the pool all observe the closed state.
        self.sender
            .lock()
            .expect("worker pool lock poisoned")
            .take();
        let handles = {
            let mut handles = self.handles.lock().expect("worker pool lock poisoned");
            std::mem::take(&mut *handles)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_every_submitted_job_before_shutdown_returns() {
        let pool = WorkerPool::new(4, 32);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("pool accepts while live");
        }
        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_refused() {
        let pool = WorkerPool::new(1, 4);
        pool.shutdown().await;
        let result = pool.submit(|| {});
        assert!(matches!(result, Err(SubmitError::Closed)));
    }

    #[tokio::test]
    async fn clones_share_the_same_queue_and_shutdown() {
        let pool = WorkerPool::new(2, 8);
        let clone = pool.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        clone
            .submit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("clone submits into the shared queue");
        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(clone.submit(|| {}).is_err());
    }
}
