//! Telemetry metric name constants.
//!
//! Centralised metric names for dispatch operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! Every metric is recorded on the consumer side of the stream, never from
//! inside a worker task, so a recorder scoped to the consuming thread sees
//! all of them.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `sluice_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `invoker`: invoker name (see [`Invoker::name`](crate::Invoker::name))
//! - `status`: outcome: "ok" or "error"

/// Total requests submitted to the worker pool.
///
/// Labels: `invoker`.
pub const SUBMISSIONS_TOTAL: &str = "sluice_submissions_total";

/// Total call results yielded to the consumer.
///
/// Labels: `invoker`, `status` ("ok" | "error").
pub const CALLS_TOTAL: &str = "sluice_calls_total";

/// Duration of a single invocation in seconds, measured inside the worker.
///
/// Labels: `invoker`.
pub const CALL_DURATION_SECONDS: &str = "sluice_call_duration_seconds";

/// Total pending calls cancelled on early termination.
///
/// Labels: `invoker`.
pub const CANCELLED_TOTAL: &str = "sluice_cancelled_total";

/// Total dispatches aborted because the overall deadline ran out.
///
/// Labels: `invoker`.
pub const DEADLINE_EXCEEDED_TOTAL: &str = "sluice_deadline_exceeded_total";
