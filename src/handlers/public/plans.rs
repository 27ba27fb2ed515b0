use axum::extract::State;
use serde::Serialize;

use crate::catalog::{PlanConfig, PlanTier};
use crate::db::AppState;
use crate::extractors::Json;

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: &'static str,
    pub name: &'static str,
    pub tier: PlanTier,
    pub price: i64,
    pub description: &'static str,
    pub features: Vec<&'static str>,
    pub is_popular: bool,
    pub is_recommended: bool,
    pub has_premium_features: bool,
}

impl From<&PlanConfig> for PlanResponse {
    fn from(plan: &PlanConfig) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            tier: plan.tier,
            price: plan.price,
            description: plan.description,
            features: plan.features.clone(),
            is_popular: plan.is_popular,
            is_recommended: plan.is_recommended,
            has_premium_features: plan.tier.has_premium_features(),
        }
    }
}

pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<PlanResponse>> {
    Json(state.catalog.plans().iter().map(PlanResponse::from).collect())
}
