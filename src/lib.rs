//! Sluice - bounded, order-preserving streaming dispatch of remote calls
//!
//! This crate drives an unbounded sequence of independent remote calls
//! through a small worker pool while holding at most a fixed number of
//! them in flight. Results come back lazily and strictly in input order,
//! either failing fast on the first transport error or passing errors
//! through as ordinary items.
//!
//! The pieces, leaves first:
//!
//! - [`Invoker`]: performs one call per request, reporting transport failures as values
//! - [`Dispatch`]: the sliding window over a [`WorkerPool`], with deadline and cancellation
//! - [`PolicyStream`]: fail-fast or pass-through, optionally pairing results with inputs
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures_util::StreamExt;
//! use serde_json::{Value, json};
//! use sluice::{DispatchOptions, HttpConfig, HttpInvoker, map_remote};
//!
//! #[tokio::main]
//! async fn main() -> sluice::Result<()> {
//!     let invoker: HttpInvoker<Value, Value> =
//!         HttpInvoker::new(HttpConfig::new("https://api.example.com/analyze"))?;
//!
//!     let docs = (0..1000).map(|i| json!({ "id": i, "text": format!("document {i}") }));
//!     let options = DispatchOptions::new().workers(4);
//!
//!     let mut results = map_remote(docs, Arc::new(invoker), &options)?;
//!     while let Some(item) = results.next().await {
//!         println!("{:?}", item?.into_result());
//!     }
//!     Ok(())
//! }
//! ```

#[cfg(feature = "cli")]
pub mod config;
pub mod dispatch;
pub mod error;
pub mod invoker;
pub mod options;
pub mod policy;
pub mod telemetry;

// Re-export main types at crate root
pub use dispatch::{Completed, Dispatch, DispatchState, WorkItem, WorkerPool, dispatch};
pub use error::{Result, SluiceError, TransportError};
pub use invoker::{CallResult, FnInvoker, HttpConfig, HttpInvoker, Invoker, invoker_fn};
pub use options::DispatchOptions;
pub use policy::{Output, PolicyStream, ResultPolicy, map_remote};

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
