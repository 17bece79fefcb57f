use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::CircuitBreakerSettings;
use crate::error::{AppError, Result};

/// The three states of spec.md §4.3's resilience wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Atomic counters mirroring the teacher's `CacheStats` instrumentation
/// style, surfaced to Prometheus via [`crate::observability::Metrics`].
#[derive(Debug, Default)]
pub struct CircuitBreakerStats {
    pub trips: AtomicU64,
    pub probes_admitted: AtomicU64,
    pub calls_rejected: AtomicU64,
}

impl CircuitBreakerStats {
    fn record_trip(&self) {
        self.trips.fetch_add(1, Ordering::Relaxed);
    }

    fn record_probe(&self) {
        self.probes_admitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejection(&self) {
        self.calls_rejected.fetch_add(1, Ordering::Relaxed);
    }
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probes_in_flight: u32,
}

/// Guards calls to the Account Gateway (spec.md §4.3): CLOSED admits
/// every call; after `failure_threshold` consecutive failures it trips
/// to OPEN and fails fast; after `cooldown` it moves to HALF_OPEN and
/// admits up to `half_open_max_probes` calls to test recovery. A probe
/// success closes the breaker; a probe failure re-opens it.
pub struct CircuitBreaker {
    settings: CircuitBreakerSettings,
    inner: Mutex<Inner>,
    pub stats: Arc<CircuitBreakerStats>,
}

/// Acquired by [`CircuitBreaker::admit`]; the caller must report the
/// outcome of the guarded call back through [`Self::success`] or
/// [`Self::failure`] so the breaker's state reflects reality.
pub struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    was_probe: bool,
}

impl<'a> Admission<'a> {
    pub async fn success(self) {
        self.breaker.on_success(self.was_probe).await;
    }

    pub async fn failure(self) {
        self.breaker.on_failure(self.was_probe).await;
    }
}

impl CircuitBreaker {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probes_in_flight: 0,
            }),
            stats: Arc::new(CircuitBreakerStats::default()),
        }
    }

    /// Returns an [`Admission`] if the call may proceed, or
    /// `ServiceUnavailable` if the breaker is OPEN and the cooldown
    /// hasn't elapsed (spec.md §4.3: "On OPEN, calls fail fast").
    pub async fn admit(&self) -> Result<Admission<'_>> {
        let mut guard = self.inner.lock().await;

        match guard.state {
            State::Closed => Ok(Admission {
                breaker: self,
                was_probe: false,
            }),
            State::Open => {
                let cooldown = Duration::from_millis(self.settings.cooldown_ms);
                let elapsed = guard.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= cooldown {
                    guard.state = State::HalfOpen;
                    guard.half_open_probes_in_flight = 1;
                    info!("circuit breaker: OPEN -> HALF_OPEN after cooldown");
                    self.stats.record_probe();
                    Ok(Admission {
                        breaker: self,
                        was_probe: true,
                    })
                } else {
                    self.stats.record_rejection();
                    Err(AppError::ServiceUnavailable(
                        "circuit breaker open".to_string(),
                    ))
                }
            }
            State::HalfOpen => {
                if guard.half_open_probes_in_flight < self.settings.half_open_max_probes {
                    guard.half_open_probes_in_flight += 1;
                    self.stats.record_probe();
                    Ok(Admission {
                        breaker: self,
                        was_probe: true,
                    })
                } else {
                    self.stats.record_rejection();
                    Err(AppError::ServiceUnavailable(
                        "circuit breaker half-open probe budget exhausted".to_string(),
                    ))
                }
            }
        }
    }

    async fn on_success(&self, was_probe: bool) {
        let mut guard = self.inner.lock().await;
        guard.consecutive_failures = 0;
        if was_probe || guard.state == State::HalfOpen {
            info!("circuit breaker: probe succeeded, HALF_OPEN -> CLOSED");
            guard.state = State::Closed;
            guard.opened_at = None;
            guard.half_open_probes_in_flight = 0;
        }
    }

    async fn on_failure(&self, was_probe: bool) {
        let mut guard = self.inner.lock().await;

        if was_probe {
            warn!("circuit breaker: probe failed, HALF_OPEN -> OPEN");
            guard.state = State::Open;
            guard.opened_at = Some(Instant::now());
            guard.half_open_probes_in_flight = 0;
            self.stats.record_trip();
            return;
        }

        guard.consecutive_failures += 1;
        if guard.state == State::Closed
            && guard.consecutive_failures >= self.settings.failure_threshold
        {
            warn!(
                failures = guard.consecutive_failures,
                "circuit breaker: CLOSED -> OPEN"
            );
            guard.state = State::Open;
            guard.opened_at = Some(Instant::now());
            self.stats.record_trip();
        }
    }

    /// Returns `true` while the breaker is OPEN, for readiness reporting.
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.state == State::Open
    }

    #[cfg(test)]
    async fn current_state(&self) -> &'static str {
        match self.inner.lock().await.state {
            State::Closed => "CLOSED",
            State::Open => "OPEN",
            State::HalfOpen => "HALF_OPEN",
        }
    }
}
