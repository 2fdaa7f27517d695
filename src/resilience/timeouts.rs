//! Timeout enforcement.
//!
//! # Responsibilities
//! - Track the overall deadline of a call across retries
//! - Size each attempt's timeout against what is left of that deadline
//!
//! # Design Decisions
//! - Uses Tokio's clock so paused-time tests see the same deadlines
//! - An attempt cut short by the overall deadline ends the call; a plain
//!   attempt timeout is a transient failure and may be retried

use std::time::Duration;
use tokio::time::Instant;

/// Overall deadline for one call, retries and backoff included.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

/// How long the next attempt may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    pub limit: Duration,
    /// True when the call deadline, not the per-attempt timeout, sets `limit`.
    pub deadline_bound: bool,
}

impl Deadline {
    /// Deadline starting now.
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    /// No overall deadline; only per-attempt timeouts apply.
    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, or `None` for an unbounded deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.elapsed()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }

    /// True if waiting `delay` still leaves time for another attempt.
    pub fn allows(&self, delay: Duration) -> bool {
        self.remaining().map_or(true, |r| r > delay)
    }

    /// Budget for the next attempt, or `None` once the deadline has passed.
    pub fn attempt_budget(&self, attempt_timeout: Duration) -> Option<AttemptBudget> {
        match self.remaining() {
            None => Some(AttemptBudget {
                limit: attempt_timeout,
                deadline_bound: false,
            }),
            Some(r) if r.is_zero() => None,
            Some(r) if r < attempt_timeout => Some(AttemptBudget {
                limit: r,
                deadline_bound: true,
            }),
            Some(_) => Some(AttemptBudget {
                limit: attempt_timeout,
                deadline_bound: false,
            }),
        }
    }
}
