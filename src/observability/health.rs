use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::CircuitBreaker;

/// Health status of a service or dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health status of a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = Self::aggregate_status(&dependencies);
        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }

    fn aggregate_status(dependencies: &[DependencyHealth]) -> HealthStatus {
        let has_unhealthy = dependencies.iter().any(|d| d.status.is_unhealthy());
        let has_degraded = dependencies.iter().any(|d| d.status.is_degraded());

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Health checker for the Ledger Store, the Account Gateway's circuit
/// breaker, and the Audit Sink's Kafka transport.
pub struct HealthChecker {
    pool: PgPool,
    gateway_breaker: Arc<CircuitBreaker>,
    kafka_connected: bool,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(pool: PgPool, gateway_breaker: Arc<CircuitBreaker>, kafka_connected: bool) -> Self {
        Self {
            pool,
            gateway_breaker,
            kafka_connected,
            start_time: std::time::Instant::now(),
        }
    }

    /// Performs a full health check of all dependencies.
    pub async fn check_all(&self) -> AggregatedHealth {
        let mut dependencies = Vec::new();

        dependencies.push(self.check_database().await);
        dependencies.push(self.check_account_gateway().await);
        dependencies.push(self.check_audit_transport().await);

        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.start_time.elapsed().as_secs(),
            dependencies,
        )
    }

    /// Checks the Ledger Store's database connectivity.
    pub async fn check_database(&self) -> DependencyHealth {
        let start = std::time::Instant::now();

        match tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").fetch_one(&self.pool)).await {
            Ok(Ok(_)) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                if latency > 100.0 {
                    DependencyHealth {
                        name: "database".to_string(),
                        status: HealthStatus::Degraded,
                        latency_ms: Some(latency),
                        message: Some("High latency detected".to_string()),
                    }
                } else {
                    DependencyHealth::healthy("database", latency)
                }
            }
            Ok(Err(e)) => DependencyHealth::unhealthy("database", format!("Query failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("database", "Connection timeout"),
        }
    }

    /// Reports the Account Gateway as degraded while its circuit
    /// breaker is OPEN (spec.md §4.3): writes are still accepted, but
    /// gateway-dependent operations fail fast.
    pub async fn check_account_gateway(&self) -> DependencyHealth {
        if self.gateway_breaker.is_open().await {
            DependencyHealth::degraded("account_gateway", "circuit breaker open")
        } else {
            DependencyHealth::healthy("account_gateway", 0.0)
        }
    }

    /// Checks whether the Audit Sink has a live Kafka transport. Its
    /// absence is degraded, never unhealthy: the engine's critical path
    /// never depends on it (spec.md §4.4).
    pub async fn check_audit_transport(&self) -> DependencyHealth {
        if self.kafka_connected {
            DependencyHealth::healthy("audit_kafka", 0.0)
        } else {
            DependencyHealth::degraded("audit_kafka", "Kafka producer not connected, buffering only")
        }
    }

    /// Liveness check - returns true if the service is alive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Readiness check - returns true if the service is ready to accept traffic.
    pub async fn is_ready(&self) -> bool {
        self.check_database().await.status.is_healthy()
    }

    /// Returns uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
