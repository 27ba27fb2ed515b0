use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptKind {
    Checkout,
    Charge,
    Upgrade,
}

/// Ledger status of one idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Succeeded,
    Failed,
    /// The gateway call timed out; it may or may not have gone through.
    Unconfirmed,
}

/// One payment attempt, keyed by the client's idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: String,
    pub idempotency_key: String,
    pub user_id: String,
    pub kind: AttemptKind,
    pub provider: String,
    pub plan_id: String,
    pub amount_cents: i64,
    pub discount_id: Option<String>,
    pub business_id: Option<String>,
    pub status: AttemptStatus,
    /// Hosted checkout session id (Stripe `cs_…`)
    pub provider_session_id: Option<String>,
    pub transaction_id: Option<String>,
    pub is_downgrade: bool,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentAttempt {
    pub idempotency_key: String,
    pub user_id: String,
    pub kind: AttemptKind,
    pub provider: String,
    pub plan_id: String,
    pub amount_cents: i64,
    pub discount_id: Option<String>,
    pub business_id: Option<String>,
}
