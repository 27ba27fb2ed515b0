use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// User-facing message constants shared by handlers and flows.
pub mod msg {
    pub const PLAN_NOT_FOUND: &str = "Plan not found";
    pub const BUSINESS_NOT_FOUND: &str = "Business not found";
    pub const SUBSCRIPTION_NOT_FOUND: &str = "Subscription not found";
    pub const WIZARD_NOT_FOUND: &str = "No listing in progress";
    pub const INVALID_PROVIDER: &str = "Invalid payment provider (expected stripe or ecomPayments)";
    pub const PAYMENT_PROCESSING_FAILED: &str = "Failed to process payment. Please try again.";
    pub const SUBSCRIPTION_NOT_ACTIVE: &str = "Subscription is not active";
    pub const SUBSCRIPTION_CANCELLED: &str = "Subscription has been cancelled";
    pub const CARD_REQUIRED: &str = "Card details are required for this payment provider";
    pub const CHECKOUT_NOT_PAID: &str = "Checkout session has not been paid";
    pub const CHECKOUT_SESSION_UNKNOWN: &str = "Unknown checkout session";
    pub const EMAIL_EMPTY: &str = "Email is required";
    pub const INVALID_EMAIL_FORMAT: &str = "Please enter a valid email address";
    pub const DISCOUNT_CODE_EMPTY: &str = "Discount code is required";
    pub const DISCOUNT_UNAVAILABLE: &str = "Could not validate discount code. Please try again.";
    pub const NOT_BUSINESS_OWNER: &str = "You do not own this business";
    pub const NOT_SUBSCRIPTION_OWNER: &str = "You do not own this subscription";
    pub const PAYMENT_IN_PROGRESS: &str = "A payment with this key is already being processed";
    pub const IDEMPOTENCY_KEY_REUSED: &str = "Idempotency key was already used for a different payment";
    pub const ACTIVATION_FAILED: &str = "Failed to process payment";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payment was attempted and failed. The message is already user-facing.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Payment went through but the subscription or listing could not be created.
    #[error("Activation failed: {0}")]
    ActivationFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::PaymentFailed(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "Payment failed", Some(msg.clone()))
            }
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable", Some(msg.clone()))
            }
            AppError::ActivationFailed(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Activation failed", Some(msg.clone()))
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts a missing row into a `NotFound` error.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}
