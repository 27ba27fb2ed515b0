mod checkout_return;
mod plans;

pub use checkout_return::*;
pub use plans::*;

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/plans", get(list_plans))
        // Stripe redirects the browser here after hosted checkout
        .route("/checkout/return", get(checkout_return))
}
