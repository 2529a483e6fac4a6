//! Crate-wide error taxonomy.
//!
//! One flat enum for every business/validation/infra error code the core
//! emits, generalizing the teacher's per-module `AuthApiError`/`AuthError`
//! `IntoResponse` pattern to the whole crate. Codes are part of the public
//! contract (spec §7) and must serialize verbatim.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    // Validation
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid order id")]
    InvalidOrderId,
    #[error("invalid proof type")]
    InvalidProofType,
    #[error("invalid proof image")]
    InvalidProofImage,
    #[error("proof too large")]
    ProofTooLarge,

    // Authentication / authorization
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("username required")]
    UsernameRequired,
    #[error("user not active")]
    UserNotActive,
    #[error("account locked")]
    AccountLocked,
    #[error("invalid credentials")]
    InvalidCredentials,

    // Business conflict
    #[error("sold out")]
    SoldOut,
    #[error("sold out for partner")]
    SoldOutForPartner,
    #[error("duplicate external order id")]
    DuplicateExternalOrderId,
    #[error("duplicate deal order")]
    DuplicateDealOrder,
    #[error("order frozen")]
    OrderFrozen,
    #[error("order fraud flagged")]
    OrderFraudFlagged,
    #[error("order finalized")]
    OrderFinalized,
    #[error("invalid workflow state")]
    InvalidWorkflowState {
        expected: String,
        observed: String,
    },
    #[error("purchase not verified")]
    PurchaseNotVerified,
    #[error("rating not verified")]
    RatingNotVerified,
    #[error("review not verified")]
    ReviewNotVerified,
    #[error("not required")]
    NotRequired,
    #[error("velocity limit exceeded")]
    VelocityLimit,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("balance limit exceeded")]
    BalanceLimitExceeded,
    #[error("wallet not found")]
    WalletNotFound,
    #[error("wallet deleted")]
    WalletDeleted,
    #[error("already requested")]
    AlreadyRequested,

    // Invite / lineage
    #[error("invalid invite")]
    InvalidInvite,
    #[error("invite role mismatch")]
    InviteRoleMismatch,
    #[error("invite expired")]
    InviteExpired,
    #[error("invite parent not active")]
    InviteParentNotActive,
    #[error("invite upstream not active")]
    InviteUpstreamNotActive,

    // AI / external
    #[error("ai not configured")]
    AiNotConfigured,
    #[error("invalid order proof")]
    InvalidOrderProof,
    #[error("rating verification failed")]
    RatingVerificationFailed,

    // Infrastructure
    #[error("timeout")]
    Timeout,
    #[error("code generation failed")]
    CodeGenerationFailed,
    #[error("unsupported proof format")]
    UnsupportedProofFormat,
    #[error("too many realtime subscribers")]
    TooManySubscribers,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidAmount => "INVALID_AMOUNT",
            AppError::InvalidOrderId => "INVALID_ORDER_ID",
            AppError::InvalidProofType => "INVALID_PROOF_TYPE",
            AppError::InvalidProofImage => "INVALID_PROOF_IMAGE",
            AppError::ProofTooLarge => "PROOF_TOO_LARGE",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::UsernameRequired => "USERNAME_REQUIRED",
            AppError::UserNotActive => "USER_NOT_ACTIVE",
            AppError::AccountLocked => "ACCOUNT_LOCKED",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::SoldOut => "SOLD_OUT",
            AppError::SoldOutForPartner => "SOLD_OUT_FOR_PARTNER",
            AppError::DuplicateExternalOrderId => "DUPLICATE_EXTERNAL_ORDER_ID",
            AppError::DuplicateDealOrder => "DUPLICATE_DEAL_ORDER",
            AppError::OrderFrozen => "ORDER_FROZEN",
            AppError::OrderFraudFlagged => "ORDER_FRAUD_FLAGGED",
            AppError::OrderFinalized => "ORDER_FINALIZED",
            AppError::InvalidWorkflowState { .. } => "INVALID_WORKFLOW_STATE",
            AppError::PurchaseNotVerified => "PURCHASE_NOT_VERIFIED",
            AppError::RatingNotVerified => "RATING_NOT_VERIFIED",
            AppError::ReviewNotVerified => "REVIEW_NOT_VERIFIED",
            AppError::NotRequired => "NOT_REQUIRED",
            AppError::VelocityLimit => "VELOCITY_LIMIT",
            AppError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            AppError::BalanceLimitExceeded => "BALANCE_LIMIT_EXCEEDED",
            AppError::WalletNotFound => "WALLET_NOT_FOUND",
            AppError::WalletDeleted => "WALLET_DELETED",
            AppError::AlreadyRequested => "ALREADY_REQUESTED",
            AppError::InvalidInvite => "INVALID_INVITE",
            AppError::InviteRoleMismatch => "INVITE_ROLE_MISMATCH",
            AppError::InviteExpired => "INVITE_EXPIRED",
            AppError::InviteParentNotActive => "INVITE_PARENT_NOT_ACTIVE",
            AppError::InviteUpstreamNotActive => "INVITE_UPSTREAM_NOT_ACTIVE",
            AppError::AiNotConfigured => "AI_NOT_CONFIGURED",
            AppError::InvalidOrderProof => "INVALID_ORDER_PROOF",
            AppError::RatingVerificationFailed => "RATING_VERIFICATION_FAILED",
            AppError::Timeout => "TIMEOUT",
            AppError::CodeGenerationFailed => "CODE_GENERATION_FAILED",
            AppError::UnsupportedProofFormat => "UNSUPPORTED_PROOF_FORMAT",
            AppError::TooManySubscribers => "TOO_MANY_SUBSCRIBERS",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::InvalidAmount
            | AppError::InvalidOrderId
            | AppError::InvalidProofType
            | AppError::InvalidProofImage
            | AppError::ProofTooLarge => StatusCode::BAD_REQUEST,

            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::UsernameRequired => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UserNotActive => StatusCode::FORBIDDEN,
            AppError::AccountLocked => StatusCode::TOO_MANY_REQUESTS,

            AppError::SoldOut
            | AppError::SoldOutForPartner
            | AppError::DuplicateExternalOrderId
            | AppError::DuplicateDealOrder
            | AppError::OrderFrozen
            | AppError::OrderFraudFlagged
            | AppError::OrderFinalized
            | AppError::InvalidWorkflowState { .. }
            | AppError::InsufficientFunds
            | AppError::BalanceLimitExceeded
            | AppError::AlreadyRequested => StatusCode::CONFLICT,

            AppError::PurchaseNotVerified
            | AppError::RatingNotVerified
            | AppError::ReviewNotVerified
            | AppError::NotRequired => StatusCode::CONFLICT,

            AppError::VelocityLimit => StatusCode::TOO_MANY_REQUESTS,
            AppError::WalletNotFound => StatusCode::NOT_FOUND,
            AppError::WalletDeleted => StatusCode::GONE,

            AppError::InvalidInvite
            | AppError::InviteRoleMismatch
            | AppError::InviteExpired
            | AppError::InviteParentNotActive
            | AppError::InviteUpstreamNotActive => StatusCode::CONFLICT,

            AppError::AiNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidOrderProof | AppError::RatingVerificationFailed => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::CodeGenerationFailed | AppError::UnsupportedProofFormat => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::TooManySubscribers => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let request_id = Uuid::new_v4().to_string();
        if status.is_server_error() {
            tracing::error!(code = self.code(), request_id, "request failed: {}", self);
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "requestId": request_id,
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
