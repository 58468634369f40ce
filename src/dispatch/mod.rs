//! Bounded-concurrency streaming dispatch.
//!
//! - [`pool`]: fixed-size worker pool the calls run on
//! - [`window`]: the bounded, ordered set of in-flight calls
//! - [`stream`]: the dispatcher that drives both and yields results in order

mod deadline;
pub mod pool;
pub mod stream;
pub mod window;

pub use pool::WorkerPool;
pub use stream::{Dispatch, DispatchState, dispatch};
pub use window::{Completed, PendingTask, WorkItem, Window};
