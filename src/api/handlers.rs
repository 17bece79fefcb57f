use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::requests::{flatten_validation_errors, ReversalBody, SearchQuery, SingleLegRequest, TransferBody};
use crate::api::responses::{ApiResponse, ErrorResponse, PaginatedResponse, TransactionResponse, ValidationErrorDetail};
use crate::engine::{AuthorizedCaller, DepositRequest, ReversalRequest, SearchRequest, TransferRequest};
use crate::error::AppError;
use crate::ledger::{Pagination, TransactionFilter};
use crate::models::{TransactionKind, TransactionStatus};

use super::routes::AppState;

type HandlerError = (StatusCode, Json<ApiResponse<()>>);

fn error_response(err: AppError) -> HandlerError {
    let code = format!("{:?}", err.reason_code()).to_uppercase();
    (
        err.status_code(),
        Json(ApiResponse::<()>::error(ErrorResponse::new(code, err.to_string()))),
    )
}

fn validation_response(errors: Vec<crate::api::requests::ValidationError>) -> HandlerError {
    let details: Vec<ValidationErrorDetail> = errors
        .into_iter()
        .map(|e| ValidationErrorDetail {
            field: e.field,
            message: e.message,
        })
        .collect();
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            ErrorResponse::new("VALIDATION_ERROR", "request validation failed").with_details(details),
        )),
    )
}

/// Extracts the calling identity from request headers (spec.md §9: caller
/// identity/authorization is supplied by an upstream gateway; this core
/// trusts the two headers rather than performing authentication itself).
fn authorized_caller(headers: &HeaderMap) -> Result<AuthorizedCaller, HandlerError> {
    let caller = headers
        .get("x-caller-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error(ErrorResponse::new(
                    "UNAUTHENTICATED",
                    "missing X-Caller-Id header",
                ))),
            )
        })?;
    let elevated = headers
        .get("x-caller-role")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("admin"))
        .unwrap_or(false);
    Ok(AuthorizedCaller::new(caller, elevated))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();
    Json(ApiResponse::success(serde_json::json!({
        "status": if db_healthy { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Detailed health check, reporting each dependency's status.
pub async fn detailed_health_check(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    match &state.health_checker {
        Some(checker) => Json(ApiResponse::success(
            serde_json::to_value(checker.check_all().await).unwrap_or_default(),
        )),
        None => Json(ApiResponse::success(serde_json::json!({ "status": "unknown" }))),
    }
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match &state.health_checker {
        Some(checker) if checker.is_ready().await => StatusCode::OK,
        Some(_) => StatusCode::SERVICE_UNAVAILABLE,
        None => {
            if sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// POST /deposits (spec.md §4.5.1, §6).
pub async fn deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SingleLegRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), HandlerError> {
    let caller = authorized_caller(&headers)?;
    body.validate()
        .map_err(|e| validation_response(flatten_validation_errors(e)))?;

    let req = DepositRequest {
        account_id: body.account_id,
        amount: body.amount,
        currency: body.currency,
        description: body.description,
        reference: body.reference,
        caller: caller.caller,
        idempotency_key: body.idempotency_key,
    };

    state
        .engine
        .deposit(req)
        .await
        .map(|tx| (StatusCode::CREATED, Json(ApiResponse::success(tx.into()))))
        .map_err(error_response)
}

/// POST /withdrawals (spec.md §4.5.1, §6).
pub async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SingleLegRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), HandlerError> {
    let caller = authorized_caller(&headers)?;
    body.validate()
        .map_err(|e| validation_response(flatten_validation_errors(e)))?;

    let req = DepositRequest {
        account_id: body.account_id,
        amount: body.amount,
        currency: body.currency,
        description: body.description,
        reference: body.reference,
        caller: caller.caller,
        idempotency_key: body.idempotency_key,
    };

    state
        .engine
        .withdraw(req)
        .await
        .map(|tx| (StatusCode::CREATED, Json(ApiResponse::success(tx.into()))))
        .map_err(error_response)
}

/// POST /transfers (spec.md §4.5.2, §6).
pub async fn transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TransferBody>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), HandlerError> {
    let caller = authorized_caller(&headers)?;
    body.validate()
        .map_err(|e| validation_response(flatten_validation_errors(e)))?;

    let req = TransferRequest {
        from_account_id: body.from_account_id,
        to_account_id: body.to_account_id,
        amount: body.amount,
        currency: body.currency,
        description: body.description,
        reference: body.reference,
        caller: caller.caller,
        idempotency_key: body.idempotency_key,
    };

    state
        .engine
        .transfer(req)
        .await
        .map(|tx| (StatusCode::CREATED, Json(ApiResponse::success(tx.into()))))
        .map_err(error_response)
}

/// POST /transactions/:id/reverse (spec.md §4.5.3, §6).
pub async fn reverse_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ReversalBody>,
) -> Result<Json<ApiResponse<TransactionResponse>>, HandlerError> {
    let caller = authorized_caller(&headers)?;
    body.validate()
        .map_err(|e| validation_response(flatten_validation_errors(e)))?;

    let req = ReversalRequest {
        original_transaction_id: id,
        reason: body.reason,
        caller: caller.caller,
        idempotency_key: body.idempotency_key,
    };

    state
        .engine
        .reverse(req)
        .await
        .map(|tx| Json(ApiResponse::success(tx.into())))
        .map_err(error_response)
}

/// GET /transactions/:id (spec.md §4.5.5, §6).
pub async fn get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransactionResponse>>, HandlerError> {
    let caller = authorized_caller(&headers)?;
    state
        .engine
        .get_by_id(id, &caller)
        .await
        .map(|tx| Json(ApiResponse::success(tx.into())))
        .map_err(error_response)
}

/// GET /accounts/:id/transactions (spec.md §4.5.5, §6).
pub async fn get_account_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<TransactionResponse>>>, HandlerError> {
    let caller = authorized_caller(&headers)?;
    let page = Pagination::new(query.limit.unwrap_or(50).clamp(1, 500), query.offset.unwrap_or(0).max(0));

    state
        .engine
        .get_by_account(account_id, &caller, page)
        .await
        .map(|result| {
            Json(ApiResponse::success(PaginatedResponse::new(
                result.items.into_iter().map(TransactionResponse::from).collect(),
                result.total,
                page.limit,
                page.offset,
            )))
        })
        .map_err(error_response)
}

/// GET /transactions (spec.md §4.1 `search`, §6).
pub async fn search_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<TransactionResponse>>>, HandlerError> {
    let caller = authorized_caller(&headers)?;
    let page = Pagination::new(query.limit.unwrap_or(50).clamp(1, 500), query.offset.unwrap_or(0).max(0));

    let kind = match query.kind.as_deref() {
        None => None,
        Some(s) => Some(parse_kind(s).map_err(|e| validation_response(vec![e]))?),
    };
    let status = match query.status.as_deref() {
        None => None,
        Some(s) => Some(parse_status(s).map_err(|e| validation_response(vec![e]))?),
    };

    let filter = TransactionFilter {
        account_id: query.account_id,
        kind,
        status,
        created_after: query.created_after,
        created_before: query.created_before,
        min_amount: query.min_amount,
        max_amount: query.max_amount,
        description_contains: query.description_contains,
        reference: query.reference,
        created_by: None,
    };

    let req = SearchRequest {
        filter,
        authorized: caller,
        page,
    };

    state
        .engine
        .search(req)
        .await
        .map(|result| {
            Json(ApiResponse::success(PaginatedResponse::new(
                result.items.into_iter().map(TransactionResponse::from).collect(),
                result.total,
                page.limit,
                page.offset,
            )))
        })
        .map_err(error_response)
}

fn parse_kind(s: &str) -> Result<TransactionKind, crate::api::requests::ValidationError> {
    match s.to_uppercase().as_str() {
        "DEPOSIT" => Ok(TransactionKind::Deposit),
        "WITHDRAWAL" => Ok(TransactionKind::Withdrawal),
        "TRANSFER" => Ok(TransactionKind::Transfer),
        "REVERSAL" => Ok(TransactionKind::Reversal),
        "FEE" => Ok(TransactionKind::Fee),
        "INTEREST" => Ok(TransactionKind::Interest),
        _ => Err(crate::api::requests::ValidationError {
            field: "kind".to_string(),
            message: format!("unknown transaction kind '{s}'"),
        }),
    }
}

fn parse_status(s: &str) -> Result<TransactionStatus, crate::api::requests::ValidationError> {
    match s.to_uppercase().as_str() {
        "PROCESSING" => Ok(TransactionStatus::Processing),
        "COMPLETED" => Ok(TransactionStatus::Completed),
        "FAILED" => Ok(TransactionStatus::Failed),
        "FAILED_REQUIRES_MANUAL_ACTION" => Ok(TransactionStatus::FailedRequiresManualAction),
        "REVERSED" => Ok(TransactionStatus::Reversed),
        _ => Err(crate::api::requests::ValidationError {
            field: "status".to_string(),
            message: format!("unknown transaction status '{s}'"),
        }),
    }
}
