use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{
    CardData, ChargeReceipt, ChargeRequest, DirectCharge, GatewayError, UpgradeReceipt,
    UpgradeRequest, rejection_from, success_body,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EcomPaymentsConfig {
    pub api_key: String,
    pub merchant_id: String,
    pub api_base: String,
}

#[derive(Serialize)]
struct ChargeBody<'a> {
    merchant_id: &'a str,
    amount: i64,
    currency: &'a str,
    card: &'a CardData,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<&'a str>,
    metadata: &'a serde_json::Value,
}

#[derive(Serialize)]
struct UpgradeBody<'a> {
    merchant_id: &'a str,
    business_id: &'a str,
    current_plan: &'a str,
    new_plan: &'a str,
    amount: i64,
    currency: &'a str,
    card: &'a CardData,
}

/// Direct card gateway. Card data is posted from the server; there is no
/// redirect step.
#[derive(Debug, Clone)]
pub struct EcomPaymentsClient {
    client: Client,
    config: Option<EcomPaymentsConfig>,
}

impl EcomPaymentsClient {
    pub fn new(config: Option<EcomPaymentsConfig>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn config(&self) -> Result<&EcomPaymentsConfig, GatewayError> {
        self.config
            .as_ref()
            .ok_or(GatewayError::NotConfigured("EcomPayments"))
    }

    async fn post<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        idempotency_key: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let config = self.config()?;

        let response = self
            .client
            .post(format!("{}{}", config.api_base, path))
            .bearer_auth(&config.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection_from(response).await);
        }

        success_body(response).await
    }
}

#[async_trait]
impl DirectCharge for EcomPaymentsClient {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let merchant_id = &self.config()?.merchant_id;
        let body = ChargeBody {
            merchant_id,
            amount: request.amount_cents,
            currency: &request.currency,
            card: &request.card,
            description: &request.description,
            customer_email: request.customer_email.as_deref(),
            metadata: &request.metadata,
        };
        let receipt: ChargeReceipt = self.post("/charges", &request.idempotency_key, &body).await?;
        tracing::debug!("EcomPayments charge {} succeeded", receipt.transaction_id);
        Ok(receipt)
    }

    async fn upgrade(&self, request: &UpgradeRequest) -> Result<UpgradeReceipt, GatewayError> {
        let merchant_id = &self.config()?.merchant_id;
        let body = UpgradeBody {
            merchant_id,
            business_id: &request.business_id,
            current_plan: &request.current_plan,
            new_plan: &request.new_plan,
            amount: request.amount_cents,
            currency: &request.currency,
            card: &request.card,
        };
        self.post("/upgrades", &request.idempotency_key, &body).await
    }
}
