use serde::Serialize;

/// Stable reason codes surfaced to callers alongside an [`AppError`].
///
/// These are the "typed category and stable reason code" spec.md §7 asks
/// for; callers (and the audit log) key off this rather than the Display
/// text, which may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Validation,
    LimitExceeded,
    InsufficientFunds,
    AccountNotFound,
    AlreadyReversed,
    ServiceUnavailable,
    FailedRequiresManualAction,
    InvalidState,
    NotFound,
    Conflict,
    Internal,
    StuckTimeout,
}

/// The core error taxonomy of the Transaction Processing Core (spec.md §7).
///
/// `IdempotentReplay` is deliberately absent: per spec.md it is "an
/// internal signal ... translated to the prior successful response" and
/// never escapes the Ledger Store's insert path.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("transaction already reversed: {0}")]
    AlreadyReversed(uuid::Uuid),

    #[error("account service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("compensation failed, requires manual action: {0}")]
    FailedRequiresManualAction(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable reason code for this error, used in audit events and by
    /// callers that need to branch on category rather than message text.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            AppError::Validation(_) => ReasonCode::Validation,
            AppError::LimitExceeded(_) => ReasonCode::LimitExceeded,
            AppError::InsufficientFunds { .. } => ReasonCode::InsufficientFunds,
            AppError::AccountNotFound(_) => ReasonCode::AccountNotFound,
            AppError::AlreadyReversed(_) => ReasonCode::AlreadyReversed,
            AppError::ServiceUnavailable(_) => ReasonCode::ServiceUnavailable,
            AppError::FailedRequiresManualAction(_) => ReasonCode::FailedRequiresManualAction,
            AppError::InvalidState(_) => ReasonCode::InvalidState,
            AppError::NotFound(_) => ReasonCode::NotFound,
            AppError::Conflict(_) => ReasonCode::Conflict,
            AppError::Database(_) | AppError::Internal(_) => ReasonCode::Internal,
        }
    }

    /// True for errors that never leave a ledger side-effect behind
    /// (spec.md §7: `LimitExceeded` and `InsufficientFunds` "surface; no
    /// ledger side-effect").
    pub fn is_pre_ledger(&self) -> bool {
        matches!(
            self,
            AppError::LimitExceeded(_) | AppError::InsufficientFunds { .. }
        )
    }

    /// HTTP status code the thin API layer maps this error to.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::LimitExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AccountNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyReversed(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::FailedRequiresManualAction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Internal-only signal distinguishing which unique constraint fired on
/// a Ledger Store insert (spec.md §9: "a discriminated result carrying
/// either the saved row or a `UniqueViolation(constraintName)`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    IdempotencyKey,
    ReversalPerOriginal,
}

pub type Result<T> = std::result::Result<T, AppError>;
