//! In-memory gateways for tests and local development.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    ChargeReceipt, ChargeRequest, CheckoutRequest, CheckoutSession, DirectCharge, GatewayError,
    HostedCheckout, UpgradeReceipt, UpgradeRequest,
};

/// Mock hosted checkout. Sessions are unpaid until `mark_paid`.
#[derive(Default)]
pub struct MockHostedCheckout {
    sessions: RwLock<Vec<CheckoutRequest>>,
    paid: RwLock<HashSet<String>>,
    fail_with: RwLock<Option<GatewayError>>,
}

impl MockHostedCheckout {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failure(&self, error: Option<GatewayError>) {
        *self.fail_with.write().await = error;
    }

    pub async fn mark_paid(&self, session_id: &str) {
        self.paid.write().await.insert(session_id.to_string());
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn last_request(&self) -> Option<CheckoutRequest> {
        self.sessions.read().await.last().cloned()
    }
}

#[async_trait]
impl HostedCheckout for MockHostedCheckout {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        let mut sessions = self.sessions.write().await;
        sessions.push(request.clone());
        let id = format!("cs_test_{}", sessions.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/c/pay/{}", id),
            id,
        })
    }

    async fn session_paid(&self, session_id: &str) -> Result<bool, GatewayError> {
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        Ok(self.paid.read().await.contains(session_id))
    }
}

/// Mock direct gateway. Deduplicates by idempotency key like a real one.
#[derive(Default)]
pub struct MockDirectCharge {
    charges: RwLock<Vec<ChargeRequest>>,
    upgrades: RwLock<Vec<UpgradeRequest>>,
    receipts: RwLock<HashMap<String, ChargeReceipt>>,
    fail_with: RwLock<Option<GatewayError>>,
    downgrade: RwLock<bool>,
}

impl MockDirectCharge {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failure(&self, error: Option<GatewayError>) {
        *self.fail_with.write().await = error;
    }

    /// Answer upgrades as downgrades (no charge, no transaction id).
    pub async fn set_downgrade(&self, downgrade: bool) {
        *self.downgrade.write().await = downgrade;
    }

    /// Charges that reached the gateway, including failed ones.
    pub async fn charge_count(&self) -> usize {
        self.charges.read().await.len()
    }

    pub async fn upgrade_count(&self) -> usize {
        self.upgrades.read().await.len()
    }

    /// Distinct successful charges.
    pub async fn settled_count(&self) -> usize {
        self.receipts.read().await.len()
    }

    pub async fn last_charge(&self) -> Option<ChargeRequest> {
        self.charges.read().await.last().cloned()
    }
}

#[async_trait]
impl DirectCharge for MockDirectCharge {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.charges.write().await.push(request.clone());
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        let mut receipts = self.receipts.write().await;
        let next = receipts.len() + 1;
        let receipt = receipts
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| ChargeReceipt {
                transaction_id: format!("ecom_tx_{}", next),
            });
        Ok(receipt.clone())
    }

    async fn upgrade(&self, request: &UpgradeRequest) -> Result<UpgradeReceipt, GatewayError> {
        self.upgrades.write().await.push(request.clone());
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        if *self.downgrade.read().await {
            return Ok(UpgradeReceipt {
                transaction_id: None,
                is_downgrade: true,
            });
        }
        Ok(UpgradeReceipt {
            transaction_id: Some(format!("ecom_up_{}", self.upgrades.read().await.len())),
            is_downgrade: false,
        })
    }
}
