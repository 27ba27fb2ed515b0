use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::discount::{DiscountInfo, DiscountOutcome, PriceQuote};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::Json;

#[derive(Debug, Deserialize)]
pub struct ApplyDiscountRequest {
    pub code: String,
    /// Plan id or display name
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct ApplyDiscountResponse {
    #[serde(flatten)]
    pub info: DiscountInfo,
    pub original_price: f64,
    pub final_price: f64,
}

/// Check a code against a plan and quote the resulting price. A rejected
/// code is a normal response with `valid: false`.
pub async fn apply_discount_code(
    State(state): State<AppState>,
    Json(request): Json<ApplyDiscountRequest>,
) -> Result<Json<ApplyDiscountResponse>> {
    let plan = state.catalog.resolve(&request.plan).or_not_found(msg::PLAN_NOT_FOUND)?;
    let outcome = state.discounts.apply_code(&request.code, plan.name)?;

    let mut quote = PriceQuote::new(plan.price as f64);
    if let DiscountOutcome::Applied(ref discount) = outcome {
        quote.apply(discount.clone());
    }

    Ok(Json(ApplyDiscountResponse {
        info: DiscountInfo::from(&outcome),
        original_price: quote.base_price(),
        final_price: quote.amount(),
    }))
}
