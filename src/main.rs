use std::sync::Arc;
use std::time::Duration;

use txn_core::api::{create_router, AppState};
use txn_core::audit::KafkaAuditSink;
use txn_core::config::Settings;
use txn_core::engine::TransactionEngine;
use txn_core::error::AppError;
use txn_core::gateway::{CircuitBreaker, HttpAccountGateway};
use txn_core::ledger::PgLedgerStore;
use txn_core::limits::PgLimitEvaluator;
use txn_core::observability::{init_logging, init_metrics, HealthChecker, LogConfig, LogFormat};
use txn_core::sweeper::Sweeper;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first (needed for log level)
    let settings = Settings::new()?;

    // Initialize structured logging
    let log_config = LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(
            std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()).as_str()
        ),
        include_target: true,
        include_file: false,
        include_line: false,
    };
    init_logging(&log_config);

    // Initialize Prometheus metrics
    let metrics_handle = init_metrics();
    info!("Configuration loaded, metrics initialized");

    // Connect to PostgreSQL
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    // Connect to Kafka (with timeout, degrade gracefully if unreachable)
    info!("Checking Kafka connection...");
    use rskafka::client::ClientBuilder;

    let brokers = vec![settings.kafka.brokers.clone()];
    let kafka_client = match tokio::time::timeout(Duration::from_secs(3), ClientBuilder::new(brokers).build()).await
    {
        Ok(Ok(client)) => {
            info!("Kafka client created successfully");
            Some(Arc::new(client))
        }
        Ok(Err(e)) => {
            tracing::warn!("Kafka connection failed: {}. Continuing without Kafka.", e);
            None
        }
        Err(_) => {
            tracing::warn!("Kafka connection timed out. Continuing without Kafka.");
            None
        }
    };

    let timezone: chrono_tz::Tz = settings
        .application
        .timezone
        .parse()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("invalid timezone '{}'", settings.application.timezone)))?;

    let ledger = Arc::new(PgLedgerStore::new(pool.clone()));
    let limits = Arc::new(PgLimitEvaluator::new(pool.clone(), timezone));
    let breaker = Arc::new(CircuitBreaker::new(settings.circuit_breaker.clone()));
    let gateway = Arc::new(HttpAccountGateway::new(settings.account_service.clone(), breaker.clone())?);
    let audit_topic = format!("{}.audit", settings.kafka.topic_prefix);
    let audit = Arc::new(KafkaAuditSink::new(settings.audit.clone(), kafka_client.clone(), audit_topic));

    let engine = Arc::new(TransactionEngine::new(ledger.clone(), gateway, limits, audit.clone()));

    // Spawn the background sweeper that fails stuck PROCESSING transactions.
    Arc::new(Sweeper::new(ledger, audit, settings.sweeper.clone())).start();
    info!("Sweeper started");

    // Create health checker
    let health_checker = Arc::new(HealthChecker::new(pool.clone(), breaker.clone(), kafka_client.is_some()));

    // Create application state with metrics handle and health checker
    let state = AppState::new(engine, pool, breaker)
        .with_metrics(metrics_handle)
        .with_health_checker(health_checker);

    // Create API router
    let app = create_router(state);

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", settings.application.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
