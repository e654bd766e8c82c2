//! Bounded worker pool for fire-and-forget background tasks.
//!
//! A pool owns a single consumer task draining a FIFO queue. Queue capacity
//! is the admission valve: once `capacity` tasks are waiting, further
//! submissions wait for a slot instead of piling up unbounded. Submissions
//! to a disabled or shut-down pool are dropped silently; background work is
//! best-effort by contract.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Fixed-capacity task queue with a single sequential consumer.
///
/// Tasks execute in submission order, one at a time; there is no parallelism
/// inside the pool. A task that panics is logged and skipped, the consumer
/// keeps going.
///
/// # Examples
///
/// ```rust
/// use tollgate::WorkerPool;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = WorkerPool::new(16);
/// pool.submit(async {
///     // anything that should not hold up the response
/// })
/// .await;
/// pool.shutdown().await;
/// # }
/// ```
pub struct WorkerPool {
    queue: Mutex<Option<mpsc::Sender<Task>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start a pool whose queue holds up to `capacity` pending tasks (a
    /// capacity of zero is treated as one).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(capacity: usize) -> Self {
        let (queue, mut pending) = mpsc::channel::<Task>(capacity.max(1));
        let consumer = tokio::spawn(async move {
            while let Some(task) = pending.recv().await {
                // One failed task must not stall everything queued behind it.
                if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                    error!("background task panicked");
                }
            }
        });
        Self {
            queue: Mutex::new(Some(queue)),
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// A pool that was never started: every submission is silently dropped.
    ///
    /// Stands in where background work is switched off, without making
    /// callers branch on an `Option<WorkerPool>`.
    pub fn disabled() -> Self {
        Self {
            queue: Mutex::new(None),
            consumer: Mutex::new(None),
        }
    }

    /// Whether the pool currently accepts submissions.
    pub fn is_active(&self) -> bool {
        lock(&self.queue).is_some()
    }

    /// Enqueue a task for sequential background execution.
    ///
    /// Waits while the queue is full, so the submitter is the one paying for
    /// a slow consumer. On a disabled or shut-down pool the task is dropped
    /// without error.
    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let queue = lock(&self.queue).clone();
        let Some(queue) = queue else {
            debug!("worker pool inactive, task dropped");
            return;
        };
        if queue.send(Box::pin(task)).await.is_err() {
            debug!("worker pool closed, task dropped");
        }
    }

    /// Close the queue and wait for the consumer to finish everything
    /// already enqueued. Calling it again (or on a disabled pool) is a
    /// no-op.
    pub async fn shutdown(&self) {
        let Some(queue) = lock(&self.queue).take() else {
            return;
        };
        drop(queue);
        let consumer = lock(&self.consumer).take();
        if let Some(consumer) = consumer {
            if consumer.await.is_err() {
                error!("worker pool consumer aborted before draining");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
