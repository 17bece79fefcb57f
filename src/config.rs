use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub kafka: KafkaSettings,
    pub application: ApplicationSettings,
    pub account_service: AccountServiceSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub sweeper: SweeperSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
    /// IANA time zone used to compute the calendar-local day/month
    /// boundaries the Limit Evaluator evaluates against (spec.md §4.2).
    pub timezone: String,
}

/// Configuration for the typed client over the remote Account Service
/// (spec.md §4.3 / §6).
#[derive(Debug, Clone, Deserialize)]
pub struct AccountServiceSettings {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Configuration for the circuit breaker guarding the Account Gateway
/// (spec.md §4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub half_open_max_probes: u32,
}

/// Configuration for the Scheduled Sweeper (spec.md §4.5.4).
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperSettings {
    pub interval_seconds: u64,
    pub stuck_after_seconds: i64,
}

/// Configuration for the Audit Sink's bounded buffer (spec.md §4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    pub channel_capacity: usize,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
