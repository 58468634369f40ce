//! Bounded streaming dispatcher.
//!
//! [`Dispatch`] pulls requests from an iterator, keeps at most `capacity`
//! of them in flight on a [`WorkerPool`], and yields their outcomes in
//! submission order. A slow early call holds back every later result
//! (head-of-line blocking) so that output position always matches input
//! position.
//!
//! Nothing happens until the stream is first polled. From then on each
//! pull tops the window back up to capacity and waits on its head only.
//!
//! Stopping early, through [`Dispatch::close`], dropping the stream, or a
//! fatal error, cancels everything still in the window. Cancellation is
//! best effort: a call that has not obtained a worker never starts, a call
//! that is running is dropped at its next suspension point, and blocking
//! work inside an invoker is never interrupted.

use std::iter::Fuse;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tracing::{debug, warn};

use super::deadline::Deadline;
use super::pool::WorkerPool;
use super::window::{Completed, WorkItem, Window};
use crate::invoker::Invoker;
use crate::telemetry;
use crate::{Result, SluiceError};

/// Lifecycle of a [`Dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Not polled yet; nothing submitted.
    Filling,
    /// Window primed; results are being drained in order.
    Draining,
    /// Inputs and window both empty.
    Exhausted,
    /// Stopped early; outstanding work cancelled.
    Cancelled,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Cancelled)
    }
}

/// Lazy, order-preserving stream of call outcomes.
///
/// Yields `Ok(Completed)` for every input, transport failures included,
/// and at most one `Err` for a fatal condition, after which it ends.
pub struct Dispatch<V: Invoker, I> {
    inputs: Fuse<I>,
    pool: WorkerPool<V>,
    window: Window<V::Request, V::Response>,
    deadline: Deadline,
    state: DispatchState,
    submitted: u64,
}

// Never pinned structurally: the timer is boxed and inputs are only
// driven through `&mut`.
impl<V: Invoker, I> Unpin for Dispatch<V, I> {}

/// Dispatch `inputs` through a pool of `capacity` workers.
///
/// Shorthand for [`Dispatch::new`] when the window and the pool are the same
/// size. `deadline` bounds the whole dispatch, starting now.
pub fn dispatch<V, I>(
    inputs: I,
    invoker: Arc<V>,
    capacity: usize,
    deadline: Option<Duration>,
) -> Result<Dispatch<V, I::IntoIter>>
where
    V: Invoker,
    I: IntoIterator<Item = V::Request>,
{
    let pool = WorkerPool::new(invoker, capacity)?;
    Dispatch::new(inputs, pool, capacity, deadline)
}

impl<V, I> Dispatch<V, I>
where
    V: Invoker,
    I: Iterator<Item = V::Request>,
{
    /// Create a dispatcher owning `pool` for its whole lifetime.
    ///
    /// `capacity` bounds the window and may exceed the pool's worker count,
    /// in which case the surplus waits for a free worker.
    pub fn new(
        inputs: impl IntoIterator<IntoIter = I>,
        pool: WorkerPool<V>,
        capacity: usize,
        deadline: Option<Duration>,
    ) -> Result<Self> {
        if pool.is_closed() {
            return Err(SluiceError::Configuration(
                "worker pool is already closed".to_string(),
            ));
        }
        Ok(Self {
            inputs: inputs.into_iter().fuse(),
            pool,
            window: Window::new(capacity)?,
            deadline: Deadline::new(deadline),
            state: DispatchState::Filling,
            submitted: 0,
        })
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Calls submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Calls submitted but not yet yielded.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// Time left before the overall deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.remaining()
    }

    /// Cancel every outstanding call and stop. Later polls yield `None`.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.cancel();
    }

    fn cancel(&mut self) {
        let cancelled = self.window.cancel_all();
        self.pool.close();
        self.state = DispatchState::Cancelled;
        if cancelled > 0 {
            metrics::counter!(telemetry::CANCELLED_TOTAL,
                "invoker" => self.pool.invoker().name().to_owned(),
            )
            .increment(cancelled as u64);
        }
        debug!(
            invoker = self.pool.invoker().name(),
            cancelled,
            submitted = self.submitted,
            "dispatch cancelled"
        );
    }

    fn finish(&mut self) {
        self.pool.close();
        self.state = DispatchState::Exhausted;
        debug!(
            invoker = self.pool.invoker().name(),
            submitted = self.submitted,
            "dispatch exhausted"
        );
    }

    /// Submit from `inputs` until the window is full or inputs run out.
    fn top_up(&mut self) {
        while self.window.has_room() {
            let Some(request) = self.inputs.next() else {
                break;
            };
            let index = self.submitted;
            let task = self.pool.submit(WorkItem { index, request });
            if let Err(task) = self.window.push(task) {
                // has_room() was checked above
                task.cancel();
                break;
            }
            self.submitted += 1;
            metrics::counter!(telemetry::SUBMISSIONS_TOTAL,
                "invoker" => self.pool.invoker().name().to_owned(),
            )
            .increment(1);
            debug!(index, in_flight = self.window.len(), "submitted");
        }
    }

    fn record(&self, completed: &Completed<V::Request, V::Response>) {
        let name = self.pool.invoker().name().to_owned();
        let status = if completed.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::CALLS_TOTAL,
            "invoker" => name.clone(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::CALL_DURATION_SECONDS, "invoker" => name)
            .record(completed.elapsed.as_secs_f64());
    }

    fn fail(&mut self, err: SluiceError) -> Poll<Option<Result<Completed<V::Request, V::Response>>>> {
        if matches!(err, SluiceError::DeadlineExceeded { .. }) {
            metrics::counter!(telemetry::DEADLINE_EXCEEDED_TOTAL,
                "invoker" => self.pool.invoker().name().to_owned(),
            )
            .increment(1);
        }
        warn!(invoker = self.pool.invoker().name(), error = %err, "dispatch aborted");
        self.cancel();
        Poll::Ready(Some(Err(err)))
    }

    fn poll_head(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Completed<V::Request, V::Response>>>> {
        if self.state.is_terminal() {
            return Poll::Ready(None);
        }

        self.top_up();
        self.state = DispatchState::Draining;

        let Some(head) = self.window.head_mut() else {
            self.finish();
            return Poll::Ready(None);
        };

        match head.poll_complete(cx) {
            Poll::Ready(Ok(completed)) => {
                self.window.pop_head();
                self.record(&completed);
                debug!(index = completed.index, ok = completed.is_ok(), "yielded");
                Poll::Ready(Some(Ok(completed)))
            }
            Poll::Ready(Err(err)) => {
                self.window.pop_head();
                self.fail(err)
            }
            Poll::Pending => {
                if self.deadline.poll_expired(cx) {
                    let budget = self.deadline.budget().unwrap_or_default();
                    self.fail(SluiceError::DeadlineExceeded { budget })
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

impl<V, I> Stream for Dispatch<V, I>
where
    V: Invoker,
    I: Iterator<Item = V::Request>,
{
    type Item = Result<Completed<V::Request, V::Response>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_head(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.state.is_terminal() {
            return (0, Some(0));
        }
        // a fatal error may end the stream at any point
        let (_, upper) = self.inputs.size_hint();
        let pending = self.window.len();
        (0, upper.and_then(|u| u.checked_add(pending)))
    }
}
