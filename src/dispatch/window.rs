//! The bounded window of in-flight calls.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::invoker::CallResult;
use crate::{Result, SluiceError};

/// A request paired with its submission index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<Req> {
    pub index: u64,
    pub request: Req,
}

/// A finished call, handed back with the request that produced it.
#[derive(Debug)]
pub struct Completed<Req, Resp> {
    pub index: u64,
    pub request: Req,
    pub result: CallResult<Resp>,
    /// Time spent inside the invoker, excluding the wait for a worker slot.
    pub elapsed: Duration,
}

impl<Req, Resp> Completed<Req, Resp> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Handle to one spawned invocation.
///
/// The task resolves to `None` when the pool closed before a worker slot
/// became free, i.e. the invoker never ran.
pub struct PendingTask<Req, Resp> {
    index: u64,
    handle: JoinHandle<Option<Completed<Req, Resp>>>,
}

impl<Req, Resp> PendingTask<Req, Resp> {
    pub(crate) fn new(index: u64, handle: JoinHandle<Option<Completed<Req, Resp>>>) -> Self {
        Self { index, handle }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task. A task still waiting for a worker never calls the invoker.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Poll for completion, turning join failures into fatal errors.
    pub(crate) fn poll_complete(&mut self, cx: &mut Context<'_>) -> Poll<Result<Completed<Req, Resp>>> {
        let index = self.index;
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Some(completed))) => Poll::Ready(Ok(completed)),
            Poll::Ready(Ok(None)) => Poll::Ready(Err(SluiceError::TaskCancelled { index })),
            Poll::Ready(Err(err)) if err.is_panic() => {
                let payload = err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Poll::Ready(Err(SluiceError::InvokerPanicked { index, message }))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(SluiceError::TaskCancelled { index })),
        }
    }
}

/// Ordered, bounded collection of pending tasks.
///
/// `len() <= capacity()` always holds and the head is the oldest submission
/// not yet yielded. Dropping the window cancels whatever is still in it.
pub struct Window<Req, Resp> {
    tasks: VecDeque<PendingTask<Req, Resp>>,
    capacity: usize,
}

impl<Req, Resp> Window<Req, Resp> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SluiceError::Configuration(
                "window capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            tasks: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn has_room(&self) -> bool {
        self.tasks.len() < self.capacity
    }

    /// Append a task at the tail. Hands the task back if the window is full.
    pub fn push(&mut self, task: PendingTask<Req, Resp>) -> std::result::Result<(), PendingTask<Req, Resp>> {
        if !self.has_room() {
            return Err(task);
        }
        self.tasks.push_back(task);
        Ok(())
    }

    pub fn head_mut(&mut self) -> Option<&mut PendingTask<Req, Resp>> {
        self.tasks.front_mut()
    }

    pub fn pop_head(&mut self) -> Option<PendingTask<Req, Resp>> {
        self.tasks.pop_front()
    }

    /// Cancel and drop every task, returning how many were still outstanding.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        for task in self.tasks.drain(..) {
            task.cancel();
        }
        count
    }
}

impl<Req, Resp> Drop for Window<Req, Resp> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
