//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: testing if upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure rate > threshold once enough calls are in the window
//! Open → Half-Open: after the open window elapses
//! Half-Open → Closed: trial request succeeds (window counters reset)
//! Half-Open → Open: trial request fails (open timer restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream hostname, kept for the process lifetime
//! - State and window counters live under one lock so a failure burst can
//!   never be observed half-applied
//! - One trial per trial interval in Half-Open; a trial that never reports
//!   back (caller gone) is replaced after the interval

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::window::{EventCount, SlidingWindow};

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { trial_started_at: Option<Instant> },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    phase: Phase,
    counter: SlidingWindow,
}

/// A failure-rate circuit breaker guarding one upstream host.
#[derive(Debug)]
pub struct CircuitBreaker {
    host: String,
    name: Option<String>,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(host: impl Into<String>, name: Option<String>, config: CircuitBreakerConfig) -> Self {
        let counter = SlidingWindow::new(
            config.counter_sliding_window(),
            config.counter_update_interval(),
        );
        Self {
            host: host.into(),
            name,
            config,
            inner: Mutex::new(BreakerInner {
                phase: Phase::Closed,
                counter,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> CircuitState {
        self.lock().phase.state()
    }

    /// Outcomes currently counted in the sliding window.
    pub fn counts(&self) -> EventCount {
        self.lock().counter.count(Instant::now())
    }

    /// Ask permission for one call. A `false` means the call must not be attempted.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();

        let phase = inner.phase;
        let allowed = match phase {
            Phase::Closed => true,
            Phase::Open { opened_at } => {
                if now.duration_since(opened_at) >= self.config.circuit_open_window() {
                    self.transition(&mut inner, Phase::HalfOpen {
                        trial_started_at: Some(now),
                    });
                    true
                } else {
                    false
                }
            }
            Phase::HalfOpen { trial_started_at } => {
                let trial_due = trial_started_at.map_or(true, |started| {
                    now.duration_since(started) >= self.config.trial_request_interval()
                });
                if trial_due {
                    inner.phase = Phase::HalfOpen {
                        trial_started_at: Some(now),
                    };
                }
                trial_due
            }
        };
        drop(inner);

        if !allowed {
            self.record_request("rejected");
        }
        allowed
    }

    /// Report a call that completed without a server error.
    pub fn on_success(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        let phase = inner.phase;
        match phase {
            Phase::Closed => inner.counter.record(now, false),
            Phase::HalfOpen { .. } => self.transition(&mut inner, Phase::Closed),
            // A call admitted before the circuit opened; it no longer counts.
            Phase::Open { .. } => {}
        }
        drop(inner);
        self.record_request("success");
    }

    /// Report a call that errored or returned a 5xx status.
    pub fn on_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        let phase = inner.phase;
        match phase {
            Phase::Closed => {
                inner.counter.record(now, true);
                let count = inner.counter.count(now);
                if count.total() >= self.config.minimum_request_threshold
                    && count.failure_rate() > self.config.failure_rate_threshold
                {
                    tracing::warn!(
                        host = %self.host,
                        failures = count.failure,
                        total = count.total(),
                        "Failure rate exceeded, opening circuit"
                    );
                    self.transition(&mut inner, Phase::Open { opened_at: now });
                }
            }
            Phase::HalfOpen { .. } => {
                tracing::warn!(host = %self.host, "Trial request failed, reopening circuit");
                self.transition(&mut inner, Phase::Open { opened_at: now });
            }
            Phase::Open { .. } => {}
        }
        drop(inner);
        self.record_request("failure");
    }

    fn transition(&self, inner: &mut BreakerInner, next: Phase) {
        let from = inner.phase.state();
        inner.phase = next;
        let to = next.state();
        if from == to {
            return;
        }
        if to == CircuitState::Closed {
            inner.counter.reset();
        }

        tracing::info!(
            host = %self.host,
            breaker = self.name.as_deref().unwrap_or(""),
            from = from.as_str(),
            to = to.as_str(),
            "Circuit breaker state changed"
        );
        if let Some(name) = &self.name {
            metrics::record_breaker_state(name, to.as_str(), to.gauge_value());
        }
    }

    fn record_request(&self, result: &'static str) {
        if let Some(name) = &self.name {
            metrics::record_breaker_request(name, result);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one breaker per upstream hostname.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Return the breaker for `host`, creating it on first use. The name is
    /// fixed by whichever call creates the breaker.
    pub fn get_or_create(&self, host: &str, name: Option<String>) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(host.to_string())
            .or_insert_with(|| {
                tracing::debug!(host = %host, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(host, name, self.config.clone()))
            })
            .value()
            .clone()
    }

    pub fn get(&self, host: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(host).map(|b| b.value().clone())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
