use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    CheckoutRequest, CheckoutSession, GatewayError, HostedCheckout, rejection_from, success_body,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Overridable for test doubles; normally https://api.stripe.com
    pub api_base: String,
}

// Prices are sent ad hoc via price_data: the amount depends on the
// discount applied at checkout time, so there is no fixed Stripe Price.

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub payment_status: String,
    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    config: Option<StripeConfig>,
}

impl StripeClient {
    /// `None` leaves the client unconfigured; every call then fails with
    /// `GatewayError::NotConfigured`.
    pub fn new(config: Option<StripeConfig>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn config(&self) -> Result<&StripeConfig, GatewayError> {
        self.config
            .as_ref()
            .ok_or(GatewayError::NotConfigured("Stripe"))
    }
}

#[async_trait]
impl HostedCheckout for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let config = self.config()?;

        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            (
                "line_items[0][price_data][currency]".into(),
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                request.product_name.clone(),
            ),
        ];
        if let Some(ref email) = request.customer_email {
            form.push(("customer_email".into(), email.clone()));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", config.api_base))
            .basic_auth(&config.secret_key, None::<&str>)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection_from(response).await);
        }

        let session: CreateCheckoutSessionResponse = success_body(response).await?;
        tracing::debug!("Created Stripe checkout session {}", session.id);

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn session_paid(&self, session_id: &str) -> Result<bool, GatewayError> {
        let config = self.config()?;

        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                config.api_base,
                urlencoding::encode(session_id)
            ))
            .basic_auth(&config.secret_key, None::<&str>)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection_from(response).await);
        }

        let session: StripeCheckoutSession = success_body(response).await?;
        Ok(session.payment_status == "paid")
    }
}
