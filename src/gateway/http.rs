use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AccountServiceSettings;
use crate::error::{AppError, Result};
use crate::gateway::{AccountGateway, BalanceOpResult, BalanceOperation, CircuitBreaker};
use crate::models::{AccountSnapshot, AccountTier};

#[derive(Debug, Deserialize)]
struct AccountWire {
    id: Uuid,
    balance: Decimal,
    currency: String,
    #[serde(rename = "accountType")]
    account_type: AccountTier,
    #[serde(rename = "availableCredit")]
    available_credit: Decimal,
    active: bool,
}

impl From<AccountWire> for AccountSnapshot {
    fn from(w: AccountWire) -> Self {
        AccountSnapshot {
            account_id: w.id,
            balance: w.balance,
            currency: w.currency,
            account_tier: w.account_type,
            available_credit: w.available_credit,
            active: w.active,
        }
    }
}

#[derive(Debug, Serialize)]
struct BalanceOperationRequest {
    #[serde(rename = "operationId")]
    operation_id: String,
    delta: Decimal,
    reason: String,
    label: String,
    #[serde(rename = "creditBalancing")]
    credit_balancing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum BalanceOpStatus {
    Applied,
    IdempotentReplay,
    Rejected,
}

#[derive(Debug, Deserialize)]
struct BalanceOperationResponseWire {
    #[serde(rename = "accountId")]
    account_id: Uuid,
    #[serde(rename = "operationId")]
    operation_id: String,
    applied: bool,
    #[serde(rename = "newBalance")]
    new_balance: Decimal,
    version: i64,
    status: BalanceOpStatus,
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    #[serde(default)]
    reason: String,
}

/// Typed `reqwest` client over the remote Account Service (spec.md §4.3,
/// §6), fronted by a [`CircuitBreaker`] and a bounded retry policy.
pub struct HttpAccountGateway {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
    breaker: Arc<CircuitBreaker>,
}

impl HttpAccountGateway {
    pub fn new(settings: AccountServiceSettings, breaker: Arc<CircuitBreaker>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url,
            max_retries: settings.max_retries,
            retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            breaker,
        })
    }

    /// Runs `call` through the circuit breaker, retrying transport/
    /// timeout failures with bounded exponential backoff (spec.md §4.3:
    /// "Retries: transient network/timeout errors retry with
    /// exponential backoff up to a small bound; HTTP 4xx ... are not
    /// retried"). `call` must itself classify its `reqwest::Error` as
    /// retryable or not.
    async fn with_resilience<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let admission = self.breaker.admit().await?;
            match call().await {
                Ok(value) => {
                    admission.success().await;
                    return Ok(value);
                }
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    admission.failure().await;
                    let delay = self.retry_base_delay * 2u32.pow(attempt);
                    warn!(attempt, %err, "account gateway call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    admission.failure().await;
                    return Err(err);
                }
            }
        }
    }
}

fn is_retryable(err: &AppError) -> bool {
    matches!(err, AppError::ServiceUnavailable(_))
}

#[async_trait::async_trait]
impl AccountGateway for HttpAccountGateway {
    async fn get_account(&self, account_id: Uuid) -> Result<AccountSnapshot> {
        self.with_resilience(|| async {
            let url = format!("{}/accounts/{}", self.base_url, account_id);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(map_transport_error)?;

            match response.status() {
                status if status.is_success() => {
                    let wire: AccountWire = response
                        .json()
                        .await
                        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
                    Ok(wire.into())
                }
                reqwest::StatusCode::NOT_FOUND => {
                    Err(AppError::AccountNotFound(account_id.to_string()))
                }
                status if status.is_server_error() => Err(AppError::ServiceUnavailable(format!(
                    "account service returned {status}"
                ))),
                status => Err(AppError::Conflict(format!(
                    "unexpected account service status {status}"
                ))),
            }
        })
        .await
    }

    async fn apply_balance_operation(&self, op: BalanceOperation) -> Result<BalanceOpResult> {
        let body = BalanceOperationRequest {
            operation_id: op.operation_id.clone(),
            delta: op.signed_delta(),
            reason: op.reason.clone(),
            label: op.label.clone(),
            credit_balancing: op.credit_balancing,
        };

        self.with_resilience(|| async {
            let url = format!("{}/accounts/{}/balance-operations", self.base_url, op.account_id);
            debug!(operation_id = %body.operation_id, "applying balance operation");
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(map_transport_error)?;

            match response.status() {
                status if status.is_success() => {
                    let wire: BalanceOperationResponseWire = response
                        .json()
                        .await
                        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
                    Ok(BalanceOpResult {
                        account_id: wire.account_id,
                        operation_id: wire.operation_id,
                        applied: wire.applied,
                        new_balance: wire.new_balance,
                        version: wire.version,
                        idempotent_replay: wire.status == BalanceOpStatus::IdempotentReplay,
                    })
                }
                reqwest::StatusCode::NOT_FOUND => {
                    Err(AppError::AccountNotFound(op.account_id.to_string()))
                }
                reqwest::StatusCode::CONFLICT => {
                    let reason = response
                        .json::<RejectionBody>()
                        .await
                        .map(|b| b.reason)
                        .unwrap_or_default();
                    if reason.to_uppercase().contains("INSUFFICIENT") {
                        Err(AppError::InsufficientFunds {
                            requested: op.amount,
                            available: Decimal::ZERO,
                        })
                    } else {
                        Err(AppError::Conflict(reason))
                    }
                }
                status if status.is_server_error() => Err(AppError::ServiceUnavailable(format!(
                    "account service returned {status}"
                ))),
                status => Err(AppError::Conflict(format!(
                    "unexpected account service status {status}"
                ))),
            }
        })
        .await
    }
}

/// Every `reqwest` transport failure (timeout, connection refused, DNS,
/// etc.) maps to the same `ServiceUnavailable` category (spec.md §7) -
/// the circuit breaker and retry budget in `with_resilience` react to
/// the category, not to which transport failure produced it.
fn map_transport_error(err: reqwest::Error) -> AppError {
    AppError::ServiceUnavailable(err.to_string())
}
