use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;

use super::handlers;
use crate::audit::KafkaAuditSink;
use crate::engine::TransactionEngine;
use crate::gateway::{CircuitBreaker, HttpAccountGateway};
use crate::ledger::PgLedgerStore;
use crate::limits::PgLimitEvaluator;
use crate::observability::HealthChecker;

/// The concrete instantiation of the generic Transaction Engine that
/// the HTTP surface is wired against (spec.md §4.5).
pub type Engine = TransactionEngine<PgLedgerStore, HttpAccountGateway, PgLimitEvaluator, KafkaAuditSink>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub pool: PgPool,
    pub gateway_breaker: Arc<CircuitBreaker>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Option<Arc<HealthChecker>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, pool: PgPool, gateway_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            engine,
            pool,
            gateway_breaker,
            metrics_handle: None,
            health_checker: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Adds health checker to the state.
    pub fn with_health_checker(mut self, checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }
}

/// Creates the main API router with all routes (spec.md §6).
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/deposits", post(handlers::deposit))
        .route("/withdrawals", post(handlers::withdraw))
        .route("/transfers", post(handlers::transfer))
        .route("/transactions", get(handlers::search_transactions))
        .route("/transactions/:id", get(handlers::get_transaction))
        .route("/transactions/:id/reverse", post(handlers::reverse_transaction))
        .route("/accounts/:id/transactions", get(handlers::get_account_transactions))
        .with_state(state)
}
