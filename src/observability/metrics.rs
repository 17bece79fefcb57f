use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the transaction core.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_transaction_created(&self, kind: &str, currency: &str) {
        counter!("txn_core_transactions_created_total", "kind" => kind.to_string(), "currency" => currency.to_string()).increment(1);
    }

    pub fn record_transaction_completed(&self, kind: &str, currency: &str) {
        counter!("txn_core_transactions_completed_total", "kind" => kind.to_string(), "currency" => currency.to_string()).increment(1);
    }

    pub fn record_transaction_failed(&self, kind: &str, reason: &str) {
        counter!("txn_core_transactions_failed_total", "kind" => kind.to_string(), "reason" => reason.to_string()).increment(1);
    }

    pub fn record_transaction_reversed(&self, kind: &str) {
        counter!("txn_core_transactions_reversed_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_transaction_requires_manual_action(&self, kind: &str) {
        counter!("txn_core_transactions_manual_action_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_ledger_write_latency(&self, duration_ms: f64) {
        histogram!("txn_core_ledger_write_duration_ms").record(duration_ms);
    }

    pub fn record_limit_decision(&self, kind: &str, allowed: bool) {
        counter!("txn_core_limit_decisions_total", "kind" => kind.to_string(), "allowed" => allowed.to_string()).increment(1);
    }

    pub fn record_gateway_call(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("txn_core_gateway_calls_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("txn_core_gateway_call_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_circuit_breaker_trip(&self) {
        counter!("txn_core_circuit_breaker_trips_total").increment(1);
    }

    pub fn record_circuit_breaker_rejection(&self) {
        counter!("txn_core_circuit_breaker_rejections_total").increment(1);
    }

    pub fn record_audit_event_dropped(&self) {
        counter!("txn_core_audit_events_dropped_total").increment(1);
    }

    pub fn set_audit_buffer_depth(&self, depth: i64) {
        gauge!("txn_core_audit_buffer_depth").set(depth as f64);
    }

    pub fn record_sweeper_run(&self, swept: u64) {
        counter!("txn_core_sweeper_swept_total").increment(swept);
    }

    pub fn set_pending_transactions(&self, count: i64) {
        gauge!("txn_core_pending_transactions").set(count as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_db_query(&self, query_type: &str, duration_ms: f64, success: bool) {
        counter!("db_queries_total", "type" => query_type.to_string(), "success" => success.to_string()).increment(1);
        histogram!("db_query_duration_ms", "type" => query_type.to_string()).record(duration_ms);
    }

    pub fn record_kafka_message(&self, topic: &str, success: bool) {
        counter!("kafka_messages_total", "topic" => topic.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("txn_core_transactions_created_total", Unit::Count, "Total transactions inserted as PROCESSING");
    describe_counter!("txn_core_transactions_completed_total", Unit::Count, "Total transactions reaching COMPLETED");
    describe_counter!("txn_core_transactions_failed_total", Unit::Count, "Total transactions reaching FAILED");
    describe_counter!("txn_core_transactions_reversed_total", Unit::Count, "Total transactions reversed");
    describe_counter!("txn_core_transactions_manual_action_total", Unit::Count, "Total transactions requiring manual action");

    describe_histogram!("txn_core_ledger_write_duration_ms", Unit::Milliseconds, "Ledger write latency in milliseconds");

    describe_counter!("txn_core_limit_decisions_total", Unit::Count, "Limit evaluator decisions by outcome");

    describe_counter!("txn_core_gateway_calls_total", Unit::Count, "Total Account Gateway calls");
    describe_histogram!("txn_core_gateway_call_duration_ms", Unit::Milliseconds, "Account Gateway call latency");

    describe_counter!("txn_core_circuit_breaker_trips_total", Unit::Count, "Circuit breaker OPEN transitions");
    describe_counter!("txn_core_circuit_breaker_rejections_total", Unit::Count, "Calls rejected while the circuit breaker is OPEN");

    describe_counter!("txn_core_audit_events_dropped_total", Unit::Count, "Non-terminal audit events evicted under buffer pressure");
    describe_gauge!("txn_core_audit_buffer_depth", Unit::Count, "Current depth of the audit sink's in-memory buffer");

    describe_counter!("txn_core_sweeper_swept_total", Unit::Count, "Transactions marked FAILED by the scheduled sweeper");
    describe_gauge!("txn_core_pending_transactions", Unit::Count, "Transactions currently PROCESSING");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");

    describe_counter!("db_queries_total", Unit::Count, "Total database queries");
    describe_histogram!("db_query_duration_ms", Unit::Milliseconds, "Database query latency in milliseconds");

    describe_counter!("kafka_messages_total", Unit::Count, "Total Kafka messages");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
