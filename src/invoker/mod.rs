//! The single-call invocation contract.
//!
//! An [`Invoker`] performs exactly one remote call per request and reports
//! ordinary transport failures as [`TransportError`] values. It must be safe
//! to call from several workers at once.
//!
//! Panicking inside [`Invoker::invoke`] is a contract violation: the
//! dispatcher treats it as fatal and aborts the stream.
//!
//! # Example
//!
//! ```rust
//! use sluice::invoker::{CallResult, FnInvoker, invoker_fn};
//!
//! let upper: FnInvoker<_, String> = invoker_fn("upper", |text: String| async move {
//!     CallResult::Ok(text.to_uppercase())
//! });
//! ```

pub mod http;

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::TransportError;

pub use http::{HttpConfig, HttpInvoker};

/// Outcome of one remote call: the response, or the captured transport failure.
pub type CallResult<T> = std::result::Result<T, TransportError>;

/// Performs one remote call for one request.
#[async_trait]
pub trait Invoker: Send + Sync + 'static {
    type Request: Send + Sync + 'static;
    type Response: Send + 'static;

    /// Invoker name for logging and metric labels.
    fn name(&self) -> &str;

    /// Perform exactly one call. Transport failures are returned, not raised.
    async fn invoke(&self, request: &Self::Request) -> CallResult<Self::Response>;
}

/// [`Invoker`] backed by an async closure.
///
/// The closure receives its own clone of each request.
pub struct FnInvoker<F, Req> {
    name: String,
    f: F,
    _request: PhantomData<fn(Req)>,
}

/// Wrap a closure `Fn(Req) -> impl Future<Output = CallResult<Resp>>` as an invoker.
pub fn invoker_fn<F, Req>(name: impl Into<String>, f: F) -> FnInvoker<F, Req> {
    FnInvoker {
        name: name.into(),
        f,
        _request: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, Req, Resp> Invoker for FnInvoker<F, Req>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallResult<Resp>> + Send + 'static,
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &Req) -> CallResult<Resp> {
        (self.f)(request.clone()).await
    }
}
