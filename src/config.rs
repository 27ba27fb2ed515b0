use std::env;

use crate::payments::{EcomPaymentsConfig, Provider, StripeConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Public base URL, used to build hosted-checkout return links
    pub base_url: String,
    pub bootstrap_user_email: Option<String>,
    pub dev_mode: bool,
    /// Provider used until someone switches it (persisted setting wins)
    pub default_provider: Provider,
    /// ISO currency code sent to the gateways
    pub currency: String,
    /// None = Stripe checkout is not configured; surfaces lazily at session creation
    pub stripe: Option<StripeConfig>,
    /// None = direct card gateway is not configured
    pub ecom: Option<EcomPaymentsConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("BIZLIST_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let default_provider = match env::var("DEFAULT_PAYMENT_PROVIDER") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "Ignoring unknown DEFAULT_PAYMENT_PROVIDER '{}', using ecomPayments",
                    value
                );
                Provider::EcomPayments
            }),
            Err(_) => Provider::EcomPayments,
        };

        let stripe = env::var("STRIPE_SECRET_KEY").ok().map(|secret_key| StripeConfig {
            secret_key,
            api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        });

        let ecom = match (env::var("ECOM_API_KEY"), env::var("ECOM_MERCHANT_ID")) {
            (Ok(api_key), Ok(merchant_id)) => Some(EcomPaymentsConfig {
                api_key,
                merchant_id,
                api_base: env::var("ECOM_API_BASE")
                    .unwrap_or_else(|_| "https://api.ecompayments.example".to_string()),
            }),
            _ => None,
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "bizlist.db".to_string()),
            base_url,
            bootstrap_user_email: env::var("BOOTSTRAP_USER_EMAIL").ok(),
            dev_mode,
            default_provider,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            stripe,
            ecom,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
