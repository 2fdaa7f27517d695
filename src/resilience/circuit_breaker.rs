//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: dependency assumed down, requests fail fast
//! - Half-Open: a single probe is testing whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive transient failures >= threshold
//! Open → Half-Open: after cool-down, first caller becomes the probe
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per identity/host key, not global
//! - Lock-free: state, failure count and open timestamp are atomics
//! - Single probe in Half-Open (prevents hammering a recovering dependency)

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::observability::metrics;

/// Breaker state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    threshold: u32,
    cooldown: Duration,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    /// Milliseconds since `epoch` at which the breaker last opened.
    opened_at_ms: AtomicU64,
    epoch: Instant,
}

/// Admission granted by the breaker for one attempt.
///
/// Settle it with [`success`](Self::success) or [`failure`](Self::failure).
/// An unsettled probe puts the breaker back to Open so the next caller can probe.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            key: key.into(),
            threshold: threshold.max(1),
            cooldown,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Admit an attempt, or return how long the caller should wait.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, Duration> {
        loop {
            match self.state() {
                CircuitState::Closed => return Ok(self.permit(false)),
                CircuitState::HalfOpen => return Err(Duration::ZERO),
                CircuitState::Open => {
                    let elapsed = Duration::from_millis(
                        self.now_ms().saturating_sub(self.opened_at_ms.load(Ordering::SeqCst)),
                    );
                    if elapsed < self.cooldown {
                        return Err(self.cooldown - elapsed);
                    }
                    if self.transition(CircuitState::Open, CircuitState::HalfOpen) {
                        tracing::info!(key = %self.key, "Circuit half-open, admitting probe");
                        return Ok(self.permit(true));
                    }
                }
            }
        }
    }

    fn permit(&self, probe: bool) -> BreakerPermit<'_> {
        BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        }
    }

    fn on_success(&self, probe: bool) {
        if probe {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            if self.transition(CircuitState::HalfOpen, CircuitState::Closed) {
                tracing::info!(key = %self.key, "Probe succeeded, circuit closed");
            }
        } else if self.state() == CircuitState::Closed {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    fn on_failure(&self, probe: bool) {
        if probe {
            self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
            if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
                tracing::warn!(
                    key = %self.key,
                    cooldown = ?self.cooldown,
                    "Probe failed, circuit re-opened"
                );
            }
            return;
        }

        if self.state() != CircuitState::Closed {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
            if self.transition(CircuitState::Closed, CircuitState::Open) {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                tracing::warn!(
                    key = %self.key,
                    failures,
                    cooldown = ?self.cooldown,
                    "Circuit opened"
                );
            }
        }
    }

    fn abandon_probe(&self) {
        if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
            tracing::debug!(key = %self.key, "Probe abandoned, circuit back to open");
        }
    }

    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        let changed = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if changed {
            metrics::record_circuit_state(&self.key, to);
        }
        changed
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl BreakerPermit<'_> {
    /// True if this attempt is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.abandon_probe();
        }
    }
}
