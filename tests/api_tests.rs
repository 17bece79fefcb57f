use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use txn_core::api::requests::{ReversalBody, SearchQuery, SingleLegRequest, TransferBody};
use txn_core::api::responses::{ApiResponse, ErrorResponse, PaginatedResponse, TransactionResponse};
use txn_core::models::{Transaction, TransactionKind, EXTERNAL_ACCOUNT};

#[test]
fn api_response_success_serializes_without_an_error_field() {
    let response: ApiResponse<String> = ApiResponse::success("ok".to_string());
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("\"data\":\"ok\""));
    assert!(json.contains("\"error\":null"));
}

#[test]
fn api_response_error_carries_a_stable_code() {
    let error = ErrorResponse::new("LIMIT_EXCEEDED", "daily amount cap exceeded");
    let response: ApiResponse<()> = ApiResponse::<()>::error(error);
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"code\":\"LIMIT_EXCEEDED\""));
    assert!(json.contains("\"data\":null"));
}

#[test]
fn transaction_response_round_trips_every_field_from_the_ledger_row() {
    let tx = Transaction::new_processing(
        TransactionKind::Deposit,
        EXTERNAL_ACCOUNT,
        Uuid::new_v4(),
        dec!(250.00),
        "USD".to_string(),
        "payroll".to_string(),
        Some("REF-1".to_string()),
        "caller-1".to_string(),
        Some("K1".to_string()),
        None,
    );
    let tx_id = tx.transaction_id;
    let response = TransactionResponse::from(tx);

    assert_eq!(response.transaction_id, tx_id);
    assert_eq!(response.kind, TransactionKind::Deposit);
    assert_eq!(response.amount, dec!(250.00));
    assert_eq!(response.currency, "USD");
    assert_eq!(response.reference, Some("REF-1".to_string()));
    assert!(response.processed_at.is_none());
}

#[test]
fn paginated_response_carries_total_independent_of_page_size() {
    let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let response = PaginatedResponse::new(items.clone(), 42, 3, 6);
    assert_eq!(response.items, items);
    assert_eq!(response.total, 42);
    assert_eq!(response.limit, 3);
    assert_eq!(response.offset, 6);
}

#[test]
fn single_leg_request_requires_positive_amount_and_iso_currency() {
    let valid = SingleLegRequest {
        account_id: Uuid::new_v4(),
        amount: dec!(10),
        currency: "USD".to_string(),
        description: "atm".to_string(),
        reference: None,
        idempotency_key: None,
    };
    assert!(valid.validate().is_ok());

    let zero_amount = SingleLegRequest {
        amount: dec!(0),
        ..valid.clone()
    };
    let errors = zero_amount.validate().unwrap_err();
    assert!(errors.iter().any(|e| e.field == "amount"));

    let bad_currency = SingleLegRequest {
        currency: "US".to_string(),
        ..valid.clone()
    };
    let errors = bad_currency.validate().unwrap_err();
    assert!(errors.iter().any(|e| e.field == "currency"));

    let blank_description = SingleLegRequest {
        description: "   ".to_string(),
        ..valid
    };
    let errors = blank_description.validate().unwrap_err();
    assert!(errors.iter().any(|e| e.field == "description"));
}

#[test]
fn transfer_body_rejects_same_source_and_destination() {
    let account = Uuid::new_v4();
    let body = TransferBody {
        from_account_id: account,
        to_account_id: account,
        amount: dec!(50),
        currency: "USD".to_string(),
        description: "loop".to_string(),
        reference: None,
        idempotency_key: None,
    };
    let errors = body.validate().unwrap_err();
    assert!(errors.iter().any(|e| e.field == "to_account_id"));
}

#[test]
fn transfer_body_accumulates_every_violation_at_once() {
    let account = Uuid::new_v4();
    let body = TransferBody {
        from_account_id: account,
        to_account_id: account,
        amount: dec!(-5),
        currency: "US".to_string(),
        description: "bad".to_string(),
        reference: None,
        idempotency_key: None,
    };
    let errors = body.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
}

#[test]
fn reversal_body_requires_a_non_blank_reason() {
    let blank = ReversalBody {
        reason: "  \t".to_string(),
        idempotency_key: None,
    };
    assert!(blank.validate().is_err());

    let present = ReversalBody {
        reason: "customer disputed the charge".to_string(),
        idempotency_key: None,
    };
    assert!(present.validate().is_ok());
}

#[test]
fn search_query_defaults_to_no_filters() {
    let query = SearchQuery::default();
    assert!(query.account_id.is_none());
    assert!(query.kind.is_none());
    assert!(query.status.is_none());
    assert!(query.limit.is_none());
    assert!(query.offset.is_none());
}

#[test]
fn search_query_deserializes_from_query_string_pairs() {
    let query: SearchQuery = serde_json::from_value(serde_json::json!({
        "account_id": Uuid::new_v4(),
        "kind": "TRANSFER",
        "limit": 25,
        "offset": 0,
    }))
    .unwrap();
    assert_eq!(query.kind.as_deref(), Some("TRANSFER"));
    assert_eq!(query.limit, Some(25));
}

#[test]
fn transaction_response_serializes_timestamps_in_rfc3339() {
    let tx = Transaction::new_processing(
        TransactionKind::Transfer,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(10),
        "USD".to_string(),
        "x".to_string(),
        None,
        "caller-1".to_string(),
        None,
        None,
    );
    let created_at = tx.created_at;
    let response = TransactionResponse::from(tx);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["created_at"].as_str().unwrap(), created_at.to_rfc3339());
    assert!(json["processed_at"].is_null());
    let _ = Utc::now();
}
