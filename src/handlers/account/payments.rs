use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

use crate::activation::{self, Activation};
use crate::catalog::PlanConfig;
use crate::db::AppState;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::id::is_valid_prefixed_id;
use crate::middleware::UserContext;
use crate::models::Subscription;
use crate::payments::{
    CardData, PaymentFlow, PaymentFlowState, PaymentOptions, PaymentResult, Provider,
    UpgradeOptions,
};
use crate::util::{append_query_params, idempotency_key_from_headers};

/// Stripe substitutes the session id into this placeholder.
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Plan id or display name
    pub plan: String,
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Overrides the selected provider for this attempt
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    pub plan: String,
    #[serde(default)]
    pub discount_code: Option<String>,
    pub card: CardData,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub business_id: String,
    pub new_plan: String,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub card: Option<CardData>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub state: PaymentFlowState,
    pub payment: PaymentResult,
    pub amount: f64,
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

fn checkout_return_urls(base_url: &str, plan: &PlanConfig, extra: &[(&str, &str)]) -> (String, String) {
    let mut success_params = vec![("success", "true"), ("plan", plan.name)];
    success_params.extend_from_slice(extra);
    let success = format!(
        "{}&session_id={}",
        append_query_params(&format!("{}/checkout/return", base_url), &success_params),
        SESSION_ID_PLACEHOLDER
    );
    let cancel = append_query_params(
        &format!("{}/checkout/return", base_url),
        &[("canceled", "true"), ("plan", plan.name)],
    );
    (success, cancel)
}

#[allow(clippy::too_many_arguments)]
fn build_options(
    state: &AppState,
    ctx: &UserContext,
    plan: &PlanConfig,
    discount_code: Option<&str>,
    provider: Provider,
    customer_email: Option<String>,
    metadata: Option<serde_json::Value>,
    idempotency_key: String,
) -> Result<PaymentOptions> {
    let discount = state.discounts.resolve_for_checkout(discount_code, plan.name)?;
    let (success_url, cancel_url) = checkout_return_urls(&state.base_url, plan, &[]);
    Ok(PaymentOptions {
        plan_name: plan.name.to_string(),
        plan_price: plan.price as f64,
        customer_email: customer_email.or_else(|| Some(ctx.user.email.clone())),
        discount,
        metadata: metadata.unwrap_or(serde_json::Value::Null),
        provider,
        success_url,
        cancel_url,
        idempotency_key,
    })
}

fn selected_provider(state: &AppState, requested: Option<&str>) -> Result<Provider> {
    match requested {
        Some(p) => p.parse(),
        None => Ok(state.providers.get()),
    }
}

/// Failed attempts become errors; timeouts are reported as accepted with
/// an unconfirmed state.
fn settle(flow: &PaymentFlow) -> Result<(StatusCode, PaymentResult)> {
    let result = flow
        .result()
        .cloned()
        .ok_or_else(|| AppError::Internal("Payment flow finished without a result".into()))?;
    match flow.state() {
        PaymentFlowState::Success => Ok((StatusCode::OK, result)),
        PaymentFlowState::Unconfirmed => Ok((StatusCode::ACCEPTED, result)),
        PaymentFlowState::Payment | PaymentFlowState::Processing => Err(AppError::PaymentFailed(
            flow.error().unwrap_or(msg::PAYMENT_PROCESSING_FAILED).to_string(),
        )),
    }
}

/// Start a checkout with the selected provider. Free checkouts activate
/// immediately; Stripe returns a URL; EcomPayments asks for `/charge`.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>)> {
    let plan = state.catalog.resolve(&request.plan).or_not_found(msg::PLAN_NOT_FOUND)?;
    let provider = selected_provider(&state, request.provider.as_deref())?;
    let options = build_options(
        &state,
        &ctx,
        plan,
        request.discount_code.as_deref(),
        provider,
        request.customer_email,
        request.metadata,
        idempotency_key_from_headers(&headers),
    )?;

    let mut flow = PaymentFlow::new();
    flow.run(state.orchestrator.create_session(&ctx.user.id, &options))
        .await?;
    let (status, payment) = settle(&flow)?;

    let activation = if payment.free_transaction() {
        let mut conn = state.db.get()?;
        Some(activation::activate_for_attempt(
            &mut conn,
            &state.catalog,
            &options.idempotency_key,
            plan.name,
            &payment,
        )?)
    } else {
        None
    };

    Ok((
        status,
        Json(PaymentResponse {
            state: flow.state(),
            payment,
            amount: options.final_amount(),
            idempotency_key: options.idempotency_key,
            activation,
            subscription: None,
        }),
    ))
}

/// Charge a card directly and activate the listing on success.
pub async fn charge_card(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(request): Json<ChargeRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>)> {
    let plan = state.catalog.resolve(&request.plan).or_not_found(msg::PLAN_NOT_FOUND)?;
    let options = build_options(
        &state,
        &ctx,
        plan,
        request.discount_code.as_deref(),
        Provider::EcomPayments,
        request.customer_email,
        request.metadata,
        idempotency_key_from_headers(&headers),
    )?;

    let mut flow = PaymentFlow::new();
    flow.run(state.orchestrator.charge_direct(&ctx.user.id, &options, &request.card))
        .await?;
    let (status, payment) = settle(&flow)?;

    let activation = if payment.success() {
        let mut conn = state.db.get()?;
        Some(activation::activate_for_attempt(
            &mut conn,
            &state.catalog,
            &options.idempotency_key,
            plan.name,
            &payment,
        )?)
    } else {
        None
    };

    Ok((
        status,
        Json(PaymentResponse {
            state: flow.state(),
            payment,
            amount: options.final_amount(),
            idempotency_key: options.idempotency_key,
            activation,
            subscription: None,
        }),
    ))
}

/// Change an existing listing's plan. The new plan's annual price is
/// charged in full.
pub async fn upgrade_listing(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(request): Json<UpgradeRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>)> {
    if !is_valid_prefixed_id(&request.business_id) {
        return Err(AppError::NotFound(msg::BUSINESS_NOT_FOUND.into()));
    }
    let new_plan = state.catalog.resolve(&request.new_plan).or_not_found(msg::PLAN_NOT_FOUND)?;
    let (_, subscription) = {
        let conn = state.db.get()?;
        activation::upgrade_target(&conn, &ctx.user.id, &request.business_id)?
    };
    let current_plan = state
        .catalog
        .by_id(&subscription.plan_id)
        .or_not_found(msg::PLAN_NOT_FOUND)?;
    if current_plan.id == new_plan.id {
        return Err(AppError::BadRequest("Listing is already on this plan".into()));
    }

    let provider = selected_provider(&state, request.provider.as_deref())?;
    let mut payment = build_options(
        &state,
        &ctx,
        new_plan,
        request.discount_code.as_deref(),
        provider,
        None,
        None,
        idempotency_key_from_headers(&headers),
    )?;
    let (success_url, _) = checkout_return_urls(
        &state.base_url,
        new_plan,
        &[("mode", "upgrade"), ("business_id", &request.business_id)],
    );
    payment.success_url = success_url;

    let options = UpgradeOptions {
        business_id: request.business_id.clone(),
        current_plan_name: current_plan.name.to_string(),
        payment,
    };

    let mut flow = PaymentFlow::new();
    flow.run(state.orchestrator.upgrade_plan(&ctx.user.id, &options, request.card.as_ref()))
        .await?;
    let (status, result) = settle(&flow)?;

    // hosted checkout finishes on /checkout/return
    let subscription = if result.success() && result.url().is_none() {
        let conn = state.db.get()?;
        Some(activation::change_plan(
            &conn,
            &ctx.user.id,
            &request.business_id,
            new_plan.name,
            &result,
        )?)
    } else {
        None
    };

    Ok((
        status,
        Json(PaymentResponse {
            state: flow.state(),
            payment: result,
            amount: options.payment.final_amount(),
            idempotency_key: options.payment.idempotency_key,
            activation: None,
            subscription,
        }),
    ))
}
