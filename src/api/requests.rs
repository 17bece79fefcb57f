use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError as FieldValidationError, ValidationErrors};

/// Ad-hoc field error for the handful of request-shape checks (e.g.
/// query-string enum parsing) that don't map onto a `Validate` DTO.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Flattens a `validator` crate [`ValidationErrors`] (field errors plus
/// any struct-level `#[validate(schema(...))]` errors, which land under
/// the `"__all__"` key) into this core's own error shape for the API
/// layer's response envelope.
pub fn flatten_validation_errors(errors: ValidationErrors) -> Vec<ValidationError> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            field_errors.iter().map(move |e| ValidationError {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect()
}

fn validate_iso4217(currency: &str) -> Result<(), FieldValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut err = FieldValidationError::new("iso4217");
        err.message = Some("currency must be a 3-letter ISO 4217 code".into());
        Err(err)
    }
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), FieldValidationError> {
    if *amount > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = FieldValidationError::new("positive");
        err.message = Some("amount must be positive".into());
        Err(err)
    }
}

fn validate_non_blank(value: &str) -> Result<(), FieldValidationError> {
    if value.trim().is_empty() {
        let mut err = FieldValidationError::new("non_blank");
        err.message = Some("cannot be empty".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// A deposit or withdrawal request body (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SingleLegRequest {
    pub account_id: Uuid,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    #[validate(custom = "validate_iso4217")]
    pub currency: String,
    #[validate(custom = "validate_non_blank")]
    pub description: String,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Request body for POST /transfers (spec.md §6). `from_account_id !=
/// to_account_id` is a cross-field rule, so it lives in a struct-level
/// `#[validate(schema(...))]` function rather than a per-field one.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_transfer_accounts_differ", skip_on_field_errors = false))]
pub struct TransferBody {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    #[validate(custom = "validate_iso4217")]
    pub currency: String,
    #[validate(custom = "validate_non_blank")]
    pub description: String,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
}

fn validate_transfer_accounts_differ(body: &TransferBody) -> Result<(), FieldValidationError> {
    if body.from_account_id == body.to_account_id {
        let mut err = FieldValidationError::new("distinct_accounts");
        err.message = Some("source and destination must differ".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Request body for POST /transactions/:id/reverse (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReversalBody {
    #[validate(custom = "validate_non_blank")]
    pub reason: String,
    pub idempotency_key: Option<String>,
}

/// Query parameters for GET /transactions (spec.md §4.1 `search`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchQuery {
    pub account_id: Option<Uuid>,
    pub kind: Option<String>,
    pub status: Option<String>,
    pub created_after: Option<chrono::DateTime<chrono::Utc>>,
    pub created_before: Option<chrono::DateTime<chrono::Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub description_contains: Option<String>,
    pub reference: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
