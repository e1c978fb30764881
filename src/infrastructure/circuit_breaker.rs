//! Circuit breaker shared by the persistent document backends.
//!
//! After `failure_threshold` consecutive failures the breaker opens and calls
//! are rejected without touching the backend. Once `reset_timeout` has passed
//! it lets probe calls through (half-open); `success_threshold` consecutive
//! probe successes close it again, a single probe failure reopens it.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use crate::config::RedisConfig;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&RedisConfig> for CircuitBreakerConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_failure_threshold,
            success_threshold: config.circuit_breaker_success_threshold,
            reset_timeout: Duration::from_secs(config.circuit_breaker_reset_timeout_seconds),
        }
    }
}

/// Lock-free circuit breaker.
pub struct CircuitBreaker {
    name: &'static str,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    probe_successes: AtomicU32,
    opened_at_ms: AtomicI64,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            probe_successes: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(0),
            config,
        }
    }

    /// Current state, promoting Open to HalfOpen once the reset timeout elapsed.
    pub fn state(&self) -> CircuitState {
        let state = CircuitState::from_u8(self.state.load(Ordering::Acquire));
        if state != CircuitState::Open {
            return state;
        }

        let elapsed = now_ms() - self.opened_at_ms.load(Ordering::Acquire);
        if elapsed < self.config.reset_timeout.as_millis() as i64 {
            return CircuitState::Open;
        }

        if self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.probe_successes.store(0, Ordering::Release);
            tracing::info!(breaker = self.name, "Circuit breaker half-open, probing backend");
        }
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a call may proceed.
    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        match CircuitState::from_u8(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => self.consecutive_failures.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let successes = self.probe_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.state
                        .store(CircuitState::Closed as u8, Ordering::Release);
                    self.consecutive_failures.store(0, Ordering::Release);
                    tracing::info!(breaker = self.name, "Circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match CircuitState::from_u8(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.open();
                    tracing::warn!(
                        breaker = self.name,
                        failures = failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.open();
                tracing::warn!(breaker = self.name, "Probe failed, circuit breaker reopened");
            }
            CircuitState::Open => self.opened_at_ms.store(now_ms(), Ordering::Release),
        }
    }

    /// Record the outcome of a call and pass the result through.
    pub fn record<T, E>(&self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    fn open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        self.opened_at_ms.store(now_ms(), Ordering::Release);
        self.probe_successes.store(0, Ordering::Release);
    }
}
