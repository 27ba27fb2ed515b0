use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Subscription lifecycle. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Cancelled,
    Inactive,
}

impl SubscriptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Pending,
    /// Zero-amount checkout after discounts
    Free,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    /// References `subscription_plans.id`
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub payment_status: PaymentStatus,
    /// Provider that took the payment ("stripe", "ecomPayments"), None for free
    pub provider: Option<String>,
    pub transaction_id: Option<String>,
    pub current_period_start: i64,
    pub current_period_end: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub user_id: String,
    pub plan_id: String,
    pub payment_status: PaymentStatus,
    pub provider: Option<String>,
    pub transaction_id: Option<String>,
}

/// Row of the `subscription_plans` table (mirror of the static catalog).
#[derive(Debug, Clone, Serialize)]
pub struct StoredPlan {
    pub id: String,
    pub name: String,
    pub price: i64,
}
