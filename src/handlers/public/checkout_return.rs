use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::activation::{self, Activation};
use crate::db::AppState;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Query};
use crate::models::{AttemptKind, Subscription};
use crate::payments::{PaymentResult, Provider};

#[derive(Debug, Deserialize)]
pub struct CheckoutReturnQuery {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub canceled: Option<bool>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Canceled,
    Activated,
    Upgraded,
}

#[derive(Debug, Serialize)]
pub struct CheckoutReturnResponse {
    pub status: ReturnStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

/// Landing point after hosted checkout.
///
/// The query string is not trusted: the session is confirmed with the
/// provider and the ledger attempt decides who and what is activated.
pub async fn checkout_return(
    State(state): State<AppState>,
    Query(query): Query<CheckoutReturnQuery>,
) -> Result<Json<CheckoutReturnResponse>> {
    if query.canceled == Some(true) || query.success != Some(true) {
        tracing::info!("Checkout canceled for plan {:?}", query.plan);
        return Ok(Json(CheckoutReturnResponse {
            status: ReturnStatus::Canceled,
            plan: query.plan,
            activation: None,
            subscription: None,
        }));
    }

    let session_id = query
        .session_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing session_id".into()))?;

    let attempt = state.orchestrator.confirm_checkout(session_id).await?;
    let plan = state
        .catalog
        .by_id(&attempt.plan_id)
        .or_not_found(msg::PLAN_NOT_FOUND)?;
    let payment = PaymentResult::charged(Provider::Stripe, session_id.to_string());

    let mut conn = state.db.get()?;
    match attempt.kind {
        AttemptKind::Upgrade => {
            let business_id = attempt
                .business_id
                .as_deref()
                .ok_or_else(|| AppError::Internal(format!("Upgrade attempt {} has no business", attempt.id)))?;
            let subscription =
                activation::change_plan(&conn, &attempt.user_id, business_id, plan.name, &payment)?;
            Ok(Json(CheckoutReturnResponse {
                status: ReturnStatus::Upgraded,
                plan: Some(plan.name.to_string()),
                activation: None,
                subscription: Some(subscription),
            }))
        }
        AttemptKind::Checkout | AttemptKind::Charge => {
            let activation = activation::activate_for_attempt(
                &mut conn,
                &state.catalog,
                &attempt.idempotency_key,
                plan.name,
                &payment,
            )?;
            Ok(Json(CheckoutReturnResponse {
                status: ReturnStatus::Activated,
                plan: Some(plan.name.to_string()),
                activation: Some(activation),
                subscription: None,
            }))
        }
    }
}
