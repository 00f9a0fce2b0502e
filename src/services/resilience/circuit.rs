//! Circuit breaker guarding calls to a single downstream dependency.
//!
//! ```text
//!   Closed ── failure rate >= threshold, samples >= minimum ──▶ Open
//!     ▲                                                          │
//!     │ all trials succeed                         wait elapsed  │
//!     │                                                          ▼
//!     └──────────────────────── HalfOpen ◀───────────────────────┘
//!                                  │
//!                                  └── any trial fails ──▶ Open (wait restarts)
//! ```
//!
//! The breaker keeps every bit of mutable state behind one mutex, so concurrent
//! callers always observe a single agreed state. The Open -> HalfOpen transition
//! happens lazily on the first call attempt (or snapshot) after the wait has
//! elapsed; no timer task exists.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitConfig {
    /// Length of the rolling outcome window evaluated while Closed.
    pub window: Duration,
    /// Failure ratio (0.0 to 1.0) at or above which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Outcomes the window must hold before the rate is considered.
    pub minimum_calls: u32,
    /// Time spent Open before trial calls are admitted.
    pub wait_in_open: Duration,
    /// Trial calls admitted while HalfOpen.
    pub half_open_calls: u32,
    /// Deadline for each protected call.
    pub call_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
            wait_in_open: Duration::from_secs(10),
            half_open_calls: 3,
            call_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Why a protected call produced no value.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    /// The breaker refused the call; the dependency was not contacted.
    #[error("call not permitted while circuit is {0}")]
    Rejected(CircuitState),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("call failed: {0}")]
    Failed(E),
}

impl<E> CallError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Point-in-time view of the breaker, used by health reporting and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub window_calls: u32,
    pub window_failures: u32,
    pub half_open_admitted: u32,
    pub half_open_successes: u32,
}

impl CircuitSnapshot {
    pub fn failure_rate(&self) -> f64 {
        if self.window_calls == 0 {
            0.0
        } else {
            f64::from(self.window_failures) / f64::from(self.window_calls)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    // Bumped on every transition; outcomes from an older generation are dropped.
    generation: u64,
    outcomes: VecDeque<(Instant, Outcome)>,
    failures: u32,
    opened_at: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            outcomes: VecDeque::new(),
            failures: 0,
            opened_at: None,
            half_open_admitted: 0,
            half_open_successes: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some((at, outcome)) = self.outcomes.front().copied() {
            if now.saturating_duration_since(at) < window {
                break;
            }
            self.outcomes.pop_front();
            if outcome == Outcome::Failure {
                self.failures -= 1;
            }
        }
    }

    fn window_calls(&self) -> u32 {
        saturating_count(self.outcomes.len())
    }

    fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            window_calls: self.window_calls(),
            window_failures: self.failures,
            half_open_admitted: self.half_open_admitted,
            half_open_successes: self.half_open_successes,
        }
    }
}

fn saturating_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Breaker for one named dependency. Share it through an `Arc`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);
        inner.snapshot()
    }

    /// Runs `call` under the breaker and the per-call timeout.
    ///
    /// Dropping the returned future before it completes cancels `call` and
    /// gives back any half-open trial slot it held.
    pub async fn call<T, E, F>(&self, call: F) -> Result<T, CallError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire()?;

        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(Ok(value)) => {
                permit.settle(Outcome::Success);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.settle(Outcome::Failure);
                Err(CallError::Failed(err))
            }
            Err(_) => {
                tracing::warn!(
                    dependency = %self.name,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "protected call timed out"
                );
                permit.settle(Outcome::Failure);
                Err(CallError::Timeout(self.config.call_timeout))
            }
        }
    }

    fn try_acquire<E>(&self) -> Result<Permit<'_>, CallError<E>> {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => return Err(CallError::Rejected(CircuitState::Open)),
            CircuitState::HalfOpen => {
                if inner.half_open_admitted >= self.config.half_open_calls {
                    return Err(CallError::Rejected(CircuitState::HalfOpen));
                }
                inner.half_open_admitted += 1;
            }
        }

        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            settled: false,
        })
    }

    fn record(&self, generation: u64, outcome: Outcome) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => {
                inner.outcomes.push_back((now, outcome));
                if outcome == Outcome::Failure {
                    inner.failures += 1;
                }
                inner.prune(now, self.config.window);
                if self.should_open(&inner) {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => match outcome {
                Outcome::Failure => self.transition(&mut inner, CircuitState::Open, now),
                Outcome::Success => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.half_open_calls {
                        self.transition(&mut inner, CircuitState::Closed, now);
                    }
                }
            },
            // Permits are never issued while Open, and a transition into Open
            // bumps the generation, so nothing reaches this arm.
            CircuitState::Open => {}
        }
    }

    fn release(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.half_open_admitted = inner.half_open_admitted.saturating_sub(1);
        }
    }

    fn should_open(&self, inner: &Inner) -> bool {
        let calls = inner.window_calls();
        if calls == 0 || calls < self.config.minimum_calls {
            return false;
        }
        f64::from(inner.failures) / f64::from(calls) >= self.config.failure_rate_threshold
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            CircuitState::Open => {
                let waited = inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= self.config.wait_in_open)
                    .unwrap_or(true);
                if waited {
                    self.transition(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::Closed => inner.prune(now, self.config.window),
            CircuitState::HalfOpen => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        match to {
            CircuitState::Open => {
                tracing::warn!(
                    dependency = %self.name,
                    %from,
                    window_calls = inner.outcomes.len(),
                    window_failures = inner.failures,
                    "circuit breaker opened"
                );
                inner.opened_at = Some(now);
            }
            CircuitState::HalfOpen => {
                tracing::info!(dependency = %self.name, "circuit breaker half-open, admitting trial calls");
            }
            CircuitState::Closed => {
                tracing::info!(dependency = %self.name, "circuit breaker closed, dependency recovered");
                inner.opened_at = None;
            }
        }

        inner.state = to;
        inner.generation += 1;
        inner.outcomes.clear();
        inner.failures = 0;
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner is left consistent between statements, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.record(self.generation, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.generation);
        }
    }
}
