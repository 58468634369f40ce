//! Options for [`map_remote`](crate::map_remote).

use std::time::Duration;

use crate::policy::ResultPolicy;
use crate::{Result, SluiceError};

/// Configuration for one policy-wrapped dispatch.
///
/// ```rust
/// # use sluice::DispatchOptions;
/// # use std::time::Duration;
/// let options = DispatchOptions::new()
///     .workers(4)
///     .deadline(Duration::from_secs(60))
///     .fail_fast(false);
/// assert_eq!(options.effective_capacity(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Concurrent calls. Default: 1.
    pub workers: usize,
    /// Window size. Default: twice the worker count.
    pub capacity: Option<usize>,
    /// Budget for the whole dispatch. Default: unbounded.
    pub deadline: Option<Duration>,
    /// Raise on the first failed call. Default: true.
    pub fail_fast: bool,
    /// Yield `(input, result)` pairs. Default: false.
    pub pair_with_input: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            capacity: None,
            deadline: None,
            fail_fast: true,
            pair_with_input: false,
        }
    }
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn capacity(mut self, n: usize) -> Self {
        self.capacity = Some(n);
        self
    }

    pub fn deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(budget);
        self
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn pair_with_input(mut self, enabled: bool) -> Self {
        self.pair_with_input = enabled;
        self
    }

    /// Window size actually used: the explicit capacity, or `2 * workers`.
    pub fn effective_capacity(&self) -> usize {
        self.capacity
            .unwrap_or_else(|| self.workers.saturating_mul(2))
    }

    pub fn policy(&self) -> ResultPolicy {
        ResultPolicy {
            fail_fast: self.fail_fast,
            pair_with_input: self.pair_with_input,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(SluiceError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.capacity == Some(0) {
            return Err(SluiceError::Configuration(
                "window capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
