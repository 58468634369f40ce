//! Overall deadline for one dispatch.
//!
//! The instant is fixed when the dispatch is created; every wait uses
//! whatever budget remains. The timer itself is only armed on the first
//! wait, so a dispatch can be built outside a runtime. A budget too large
//! to represent as an instant is treated as unbounded.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{Instant, Sleep};

pub(crate) struct Deadline {
    budget: Option<Duration>,
    at: Option<Instant>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    pub(crate) fn new(budget: Option<Duration>) -> Self {
        Self {
            budget,
            at: budget.and_then(|b| Instant::now().checked_add(b)),
            timer: None,
        }
    }

    pub(crate) fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Time left before the deadline, `None` when unbounded.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Register interest in the deadline and report whether it has passed.
    pub(crate) fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        let Some(at) = self.at else {
            return false;
        };
        let timer = self
            .timer
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(at)));
        timer.as_mut().poll(cx).is_ready()
    }
}
