//! Payment providers, the provider preference, and the orchestration layer.
//!
//! Two gateways sit behind trait seams: `HostedCheckout` (Stripe Checkout,
//! redirect based) and `DirectCharge` (EcomPayments, card data posted from
//! our side). `PaymentOrchestrator` routes each request to one of them and
//! records every attempt in the `payment_attempts` ledger.

mod ecom;
pub mod mock;
mod orchestrator;
mod selector;
mod stripe;

pub use ecom::*;
pub use orchestrator::*;
pub use selector::*;
pub use stripe::*;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Datelike;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discount::{AppliedDiscount, apply_discount, round2, to_minor_units};
use crate::error::{AppError, msg};

/// Gateway that takes a payment. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "stripe")]
    Stripe,
    #[serde(rename = "ecomPayments")]
    EcomPayments,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::EcomPayments => "ecomPayments",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stripe" => Ok(Provider::Stripe),
            "ecompayments" | "ecom" => Ok(Provider::EcomPayments),
            _ => Err(AppError::BadRequest(msg::INVALID_PROVIDER.into())),
        }
    }
}

// ============ Requests & results ============

/// Everything needed for one payment attempt. Built fresh per attempt.
#[derive(Debug, Clone)]
pub struct PaymentOptions {
    pub plan_name: String,
    /// Undiscounted plan price
    pub plan_price: f64,
    pub customer_email: Option<String>,
    pub discount: Option<AppliedDiscount>,
    /// Passed through to the gateway untouched
    pub metadata: serde_json::Value,
    pub provider: Provider,
    pub success_url: String,
    pub cancel_url: String,
    /// Client-generated; repeating it never charges twice
    pub idempotency_key: String,
}

impl PaymentOptions {
    /// Price after the discount, rounded to cents.
    pub fn final_amount(&self) -> f64 {
        match &self.discount {
            Some(d) => apply_discount(self.plan_price, d.discount_type, d.discount_value),
            None => round2(self.plan_price.max(0.0)),
        }
    }

    pub fn amount_cents(&self) -> i64 {
        to_minor_units(self.final_amount())
    }
}

/// Plan change for an existing listing.
#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    pub business_id: String,
    pub current_plan_name: String,
    /// `plan_name` / `plan_price` describe the target plan
    pub payment: PaymentOptions,
}

/// Outcome of a payment operation.
///
/// Constructed only through the associated functions, so a failed result
/// always carries an error message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    free_transaction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    provider: Provider,
    is_downgrade: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    outcome_unknown: bool,
}

impl PaymentResult {
    fn base(provider: Provider, success: bool) -> Self {
        Self {
            success,
            url: None,
            free_transaction: false,
            transaction_id: None,
            error: None,
            provider,
            is_downgrade: false,
            outcome_unknown: false,
        }
    }

    /// Nothing to charge after discounts.
    pub fn free(provider: Provider) -> Self {
        Self {
            free_transaction: true,
            ..Self::base(provider, true)
        }
    }

    /// Hosted checkout created; the client must follow `url`.
    pub fn redirect(provider: Provider, url: String) -> Self {
        Self {
            url: Some(url),
            ..Self::base(provider, true)
        }
    }

    /// Direct provider prepared; the caller continues with a card charge.
    pub fn awaiting_card(provider: Provider) -> Self {
        Self::base(provider, true)
    }

    pub fn charged(provider: Provider, transaction_id: String) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            ..Self::base(provider, true)
        }
    }

    pub fn upgraded(provider: Provider, transaction_id: Option<String>, is_downgrade: bool) -> Self {
        Self {
            transaction_id,
            is_downgrade,
            ..Self::base(provider, true)
        }
    }

    pub fn failed(provider: Provider, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(provider, false)
        }
    }

    /// The gateway did not answer in time; the charge may or may not exist.
    pub fn unconfirmed(provider: Provider) -> Self {
        Self {
            error: Some(PaymentError::OutcomeUnknown.user_message()),
            outcome_unknown: true,
            ..Self::base(provider, false)
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn free_transaction(&self) -> bool {
        self.free_transaction
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn is_downgrade(&self) -> bool {
        self.is_downgrade
    }

    pub fn outcome_unknown(&self) -> bool {
        self.outcome_unknown
    }

    /// True for the EcomPayments preparation marker returned by `create_session`.
    pub fn needs_direct_charge(&self) -> bool {
        self.success
            && self.provider == Provider::EcomPayments
            && !self.free_transaction
            && self.transaction_id.is_none()
            && !self.is_downgrade
    }
}

/// Card details for the direct gateway. Never persisted.
#[derive(Clone, Serialize, Deserialize)]
pub struct CardData {
    pub number: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub cvv: String,
    pub holder_name: String,
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits: Vec<char> = self.digits().chars().collect();
        let last4: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        f.debug_struct("CardData")
            .field("number", &format!("****{}", last4))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .finish_non_exhaustive()
    }
}

impl CardData {
    /// Card number with spaces and dashes removed.
    pub fn digits(&self) -> String {
        self.number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect()
    }

    /// Local checks run before any network call.
    pub fn validate(&self) -> Result<(), &'static str> {
        let today = chrono::Utc::now().date_naive();
        self.validate_at(today.year() as u32, today.month())
    }

    pub fn validate_at(&self, year: u32, month: u32) -> Result<(), &'static str> {
        if self.holder_name.trim().is_empty() {
            return Err("Cardholder name is required");
        }
        let digits = self.digits();
        if !(13..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err("Please enter a valid card number");
        }
        if !(1..=12).contains(&self.exp_month) {
            return Err("Please enter a valid expiry month");
        }
        // two-digit years are accepted
        let exp_year = if self.exp_year < 100 {
            2000 + self.exp_year
        } else {
            self.exp_year
        };
        if (exp_year, self.exp_month) < (year, month) {
            return Err("Your card has expired");
        }
        let cvv = self.cvv.trim();
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err("Please enter a valid security code");
        }
        Ok(())
    }
}

// ============ Errors ============

/// Raw failure from a gateway client. Logged, never shown to users.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("gateway request timed out")]
    Timeout,

    /// A 2xx reply whose body could not be read. The gateway may have
    /// acted on the request.
    #[error("unreadable gateway response: {0}")]
    UnreadableResponse(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() || e.is_body() {
            GatewayError::UnreadableResponse(e.to_string())
        } else if e.is_connect() || e.is_request() {
            GatewayError::Transport(e.to_string())
        } else {
            GatewayError::Rejected(e.to_string())
        }
    }
}

/// User-facing payment error categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    Declined,
    InvalidInput,
    Network,
    ServiceUnavailable,
    /// Unrecognized gateway message, shown as-is
    Generic(String),
    OutcomeUnknown,
}

impl PaymentError {
    pub fn classify(err: &GatewayError) -> Self {
        match err {
            GatewayError::Timeout | GatewayError::UnreadableResponse(_) => PaymentError::OutcomeUnknown,
            GatewayError::Transport(_) => PaymentError::Network,
            GatewayError::NotConfigured(_) => PaymentError::ServiceUnavailable,
            GatewayError::Rejected(message) => {
                let lower = message.to_lowercase();
                if lower.contains("declined") {
                    PaymentError::Declined
                } else if lower.contains("invalid") {
                    PaymentError::InvalidInput
                } else if lower.contains("network") || lower.contains("connection") {
                    PaymentError::Network
                } else if lower.contains("not configured")
                    || lower.contains("credentials")
                    || lower.contains("unavailable")
                {
                    PaymentError::ServiceUnavailable
                } else {
                    PaymentError::Generic(message.clone())
                }
            }
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Declined => {
                "Your card was declined. Please try a different card or contact your bank.".into()
            }
            PaymentError::InvalidInput => {
                "Invalid payment information. Please check your card details and try again.".into()
            }
            PaymentError::Network => {
                "Network error. Please check your connection and try again.".into()
            }
            PaymentError::ServiceUnavailable => {
                "Payment service is temporarily unavailable. Please try again later.".into()
            }
            PaymentError::Generic(message) => message.clone(),
            PaymentError::OutcomeUnknown => {
                "We could not confirm your payment. Please check your account before trying again."
                    .into()
            }
        }
    }
}

// ============ Gateway seams ============

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub product_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: Vec<(String, String)>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub card: CardData,
    pub description: String,
    pub customer_email: Option<String>,
    pub metadata: serde_json::Value,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChargeReceipt {
    pub transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub business_id: String,
    pub current_plan: String,
    pub new_plan: String,
    pub amount_cents: i64,
    pub currency: String,
    pub card: CardData,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpgradeReceipt {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub is_downgrade: bool,
}

/// Redirect-based checkout (Stripe).
#[async_trait]
pub trait HostedCheckout: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Whether the session was paid.
    async fn session_paid(&self, session_id: &str) -> Result<bool, GatewayError>;
}

/// Card charges posted from the server (EcomPayments).
#[async_trait]
pub trait DirectCharge: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError>;

    async fn upgrade(&self, request: &UpgradeRequest) -> Result<UpgradeReceipt, GatewayError>;
}

/// Decode the body of a successful gateway response.
async fn success_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let bytes = response.bytes().await?;
    decode_success_body(&bytes)
}

fn decode_success_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(bytes).map_err(|e| GatewayError::UnreadableResponse(e.to_string()))
}

/// Pull the most useful message out of a non-2xx gateway response.
async fn rejection_from(response: reqwest::Response) -> GatewayError {
    #[derive(Deserialize)]
    struct Detail {
        message: Option<String>,
    }
    #[derive(Deserialize)]
    struct Body {
        error: Option<Detail>,
        message: Option<String>,
    }

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Body>(&text)
        .ok()
        .and_then(|b| b.error.and_then(|d| d.message).or(b.message))
        .unwrap_or(text);

    if status.is_server_error() && message.is_empty() {
        GatewayError::Rejected("Payment service unavailable".into())
    } else if message.is_empty() {
        GatewayError::Rejected(format!("Gateway returned {}", status))
    } else {
        GatewayError::Rejected(message)
    }
}
