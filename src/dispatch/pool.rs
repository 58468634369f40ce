//! Fixed-size worker pool over tokio tasks.
//!
//! Every submission becomes its own task, but a task only calls the invoker
//! once it holds one of `workers` semaphore permits. Closing the pool closes
//! the semaphore: tasks still queued for a permit return without invoking.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

use super::window::{Completed, PendingTask, WorkItem};
use crate::invoker::Invoker;
use crate::{Result, SluiceError};

pub struct WorkerPool<V: Invoker> {
    invoker: Arc<V>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl<V: Invoker> WorkerPool<V> {
    /// Create a pool running at most `workers` invocations concurrently.
    pub fn new(invoker: Arc<V>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(SluiceError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            invoker,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn invoker(&self) -> &V {
        &self.invoker
    }

    /// Number of workers currently running a call.
    pub fn busy(&self) -> usize {
        self.workers - self.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Spawn the invocation for `item`. Does not wait for a free worker.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn submit(&self, item: WorkItem<V::Request>) -> PendingTask<V::Request, V::Response> {
        let WorkItem { index, request } = item;
        let invoker = Arc::clone(&self.invoker);
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                debug!(index, "pool closed before item started");
                return None;
            };
            let started = Instant::now();
            let result = invoker.invoke(&request).await;
            Some(Completed {
                index,
                request,
                result,
                elapsed: started.elapsed(),
            })
        });

        PendingTask::new(index, handle)
    }

    /// Stop accepting work. Queued tasks will not start.
    pub fn close(&self) {
        self.permits.close();
    }
}

impl<V: Invoker> Drop for WorkerPool<V> {
    fn drop(&mut self) {
        self.close();
    }
}
