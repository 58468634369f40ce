//! Error and pairing policy over a [`Dispatch`].
//!
//! The dispatcher reports transport failures as data. [`PolicyStream`]
//! decides what the consumer sees: under fail-fast the first failure is
//! raised as [`SluiceError::Transport`] and everything still outstanding is
//! cancelled; under pass-through failures are yielded like any other item.
//! Optionally each item carries the request that produced it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use tracing::warn;

use crate::dispatch::{Completed, Dispatch, WorkerPool};
use crate::invoker::{CallResult, Invoker};
use crate::options::DispatchOptions;
use crate::{Result, SluiceError};

/// How call outcomes are surfaced to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultPolicy {
    pub fail_fast: bool,
    pub pair_with_input: bool,
}

impl Default for ResultPolicy {
    fn default() -> Self {
        Self {
            fail_fast: true,
            pair_with_input: false,
        }
    }
}

/// One element of a policy-wrapped stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Output<Req, Resp> {
    Result(CallResult<Resp>),
    Paired { input: Req, result: CallResult<Resp> },
}

impl<Req, Resp> Output<Req, Resp> {
    pub fn result(&self) -> &CallResult<Resp> {
        match self {
            Self::Result(result) | Self::Paired { result, .. } => result,
        }
    }

    pub fn input(&self) -> Option<&Req> {
        match self {
            Self::Result(_) => None,
            Self::Paired { input, .. } => Some(input),
        }
    }

    pub fn into_result(self) -> CallResult<Resp> {
        match self {
            Self::Result(result) | Self::Paired { result, .. } => result,
        }
    }

    pub fn into_parts(self) -> (Option<Req>, CallResult<Resp>) {
        match self {
            Self::Result(result) => (None, result),
            Self::Paired { input, result } => (Some(input), result),
        }
    }
}

/// A [`Dispatch`] with a [`ResultPolicy`] applied.
pub struct PolicyStream<V: Invoker, I> {
    inner: Dispatch<V, I>,
    policy: ResultPolicy,
    done: bool,
}

impl<V, I> PolicyStream<V, I>
where
    V: Invoker,
    I: Iterator<Item = V::Request>,
{
    pub fn new(inner: Dispatch<V, I>, policy: ResultPolicy) -> Self {
        Self {
            inner,
            policy,
            done: false,
        }
    }

    pub fn policy(&self) -> ResultPolicy {
        self.policy
    }

    pub fn dispatch(&self) -> &Dispatch<V, I> {
        &self.inner
    }

    /// Stop early, cancelling every outstanding call.
    pub fn close(&mut self) {
        self.done = true;
        self.inner.close();
    }

    fn shape(&self, completed: Completed<V::Request, V::Response>) -> Output<V::Request, V::Response> {
        if self.policy.pair_with_input {
            Output::Paired {
                input: completed.request,
                result: completed.result,
            }
        } else {
            Output::Result(completed.result)
        }
    }
}

impl<V, I> Stream for PolicyStream<V, I>
where
    V: Invoker,
    I: Iterator<Item = V::Request>,
{
    type Item = Result<Output<V::Request, V::Response>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let Some(next) = ready!(Pin::new(&mut this.inner).poll_next(cx)) else {
            this.done = true;
            return Poll::Ready(None);
        };

        let completed = match next {
            Ok(completed) => completed,
            Err(err) => {
                this.done = true;
                return Poll::Ready(Some(Err(err)));
            }
        };

        if this.policy.fail_fast {
            if let Err(source) = completed.result {
                let index = completed.index;
                warn!(index, error = %source, "failing fast on transport error");
                this.close();
                return Poll::Ready(Some(Err(SluiceError::Transport { index, source })));
            }
        }

        Poll::Ready(Some(Ok(this.shape(completed))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let (_, upper) = self.inner.size_hint();
        // fail-fast may stop at any element
        (0, upper)
    }
}

/// Call `invoker` once per input through a bounded window, with `options`
/// deciding concurrency, deadline, and how failures are surfaced.
///
/// Results arrive in input order. Nothing is submitted until the returned
/// stream is first polled.
pub fn map_remote<V, I>(
    inputs: I,
    invoker: Arc<V>,
    options: &DispatchOptions,
) -> Result<PolicyStream<V, I::IntoIter>>
where
    V: Invoker,
    I: IntoIterator<Item = V::Request>,
{
    options.validate()?;
    let pool = WorkerPool::new(invoker, options.workers)?;
    let inner = Dispatch::new(inputs, pool, options.effective_capacity(), options.deadline)?;
    Ok(PolicyStream::new(inner, options.policy()))
}
