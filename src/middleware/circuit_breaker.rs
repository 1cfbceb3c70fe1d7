// Circuit breaker guarding the translation backend
//
// Closed: calls pass through. After `failure_threshold` consecutive failures
// the breaker opens and calls fail fast. Once `cooldown` has elapsed a probe
// is let through (half-open); `success_threshold` consecutive successes
// close it again, any failure reopens it.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub cooldown: Duration,
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: usize },
    Open { since: Instant },
    HalfOpen { successes: usize },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    trips: u64,
    total_failures: u64,
    total_successes: u64,
}

/// Cheap to clone; clones share state
#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Closed { failures: 0 },
                trips: 0,
                total_failures: 0,
                total_successes: 0,
            })),
            config,
        }
    }

    /// Whether a call may go out now. Moves Open -> HalfOpen once the
    /// cooldown has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
            Phase::Open { since } if since.elapsed() >= self.config.cooldown => {
                info!("{} circuit half-open, probing backend", self.name);
                inner.phase = Phase::HalfOpen { successes: 0 };
                true
            }
            Phase::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;

        inner.phase = match inner.phase {
            Phase::HalfOpen { successes } if successes + 1 >= self.config.success_threshold => {
                info!("{} circuit closed, backend recovered", self.name);
                Phase::Closed { failures: 0 }
            }
            Phase::HalfOpen { successes } => Phase::HalfOpen {
                successes: successes + 1,
            },
            _ => Phase::Closed { failures: 0 },
        };
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;

        let trip = match inner.phase {
            Phase::Closed { failures } if failures + 1 < self.config.failure_threshold => {
                inner.phase = Phase::Closed {
                    failures: failures + 1,
                };
                false
            }
            Phase::Open { .. } => false,
            _ => true,
        };

        if trip {
            warn!(
                "{} circuit opened, failing fast for {:?}",
                self.name, self.config.cooldown
            );
            inner.phase = Phase::Open {
                since: Instant::now(),
            };
            inner.trips += 1;
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.inner.lock().phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let state = match inner.phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        };
        CircuitBreakerStats {
            state,
            trips: inner.trips,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub trips: u64,
    pub total_failures: u64,
    pub total_successes: u64,
}
