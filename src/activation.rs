//! Subscription and business lifecycle driven by successful payments.
//!
//! After a payment: resolve the plan, create the subscription, create the
//! inactive placeholder business, then hand over to the wizard through the
//! resume token. The wizard's submission later fills in and activates the
//! business. Earlier steps are not rolled back when a later one fails.

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::catalog::PlanCatalog;
use crate::db::queries;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::models::{
    Business, CreateSubscription, PaymentStatus, Subscription, SubscriptionStatus, WizardFormData,
};
use crate::payments::PaymentResult;
use crate::wizard::ListingWizard;

#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    pub subscription: Subscription,
    pub business: Business,
}

/// Create the subscription and placeholder business for a settled payment.
pub fn activate(
    conn: &Connection,
    catalog: &PlanCatalog,
    user_id: &str,
    plan_name: &str,
    payment: &PaymentResult,
) -> Result<Activation> {
    if !payment.success() {
        return Err(AppError::PaymentFailed(
            payment.error().unwrap_or(msg::PAYMENT_PROCESSING_FAILED).to_string(),
        ));
    }

    let plan = queries::get_stored_plan_by_name(conn, plan_name)?.or_not_found(msg::PLAN_NOT_FOUND)?;

    let payment_status = if payment.free_transaction() {
        PaymentStatus::Free
    } else {
        PaymentStatus::Paid
    };
    let subscription = queries::create_subscription(
        conn,
        &CreateSubscription {
            user_id: user_id.to_string(),
            plan_id: plan.id.clone(),
            payment_status,
            provider: (!payment.free_transaction()).then(|| payment.provider().as_str().to_string()),
            transaction_id: payment.transaction_id().map(String::from),
        },
    )
    .map_err(|e| {
        tracing::error!("Subscription creation failed for user {}: {}", user_id, e);
        AppError::ActivationFailed(msg::ACTIVATION_FAILED.into())
    })?;

    let business = queries::create_placeholder_business(conn, user_id, &subscription.id).map_err(|e| {
        tracing::error!(
            "Placeholder business creation failed for subscription {}: {}",
            subscription.id,
            e
        );
        AppError::ActivationFailed(msg::ACTIVATION_FAILED.into())
    })?;

    tracing::info!(
        "Activated {} for user {}: subscription {}, business {}",
        plan.name,
        user_id,
        subscription.id,
        business.id
    );

    hand_to_wizard(conn, catalog, user_id, plan_name, &business.id)?;

    Ok(Activation {
        subscription,
        business,
    })
}

/// Activate for a settled ledger attempt at most once. Replays of the same
/// idempotency key get the subscription and business created the first time.
///
/// Runs in one immediate transaction: concurrent replays queue on the write
/// lock and see the business linked by whichever ran first.
pub fn activate_for_attempt(
    conn: &mut Connection,
    catalog: &PlanCatalog,
    idempotency_key: &str,
    plan_name: &str,
    payment: &PaymentResult,
) -> Result<Activation> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let attempt = queries::get_payment_attempt_by_key(&tx, idempotency_key)?
        .ok_or_else(|| AppError::Internal(format!("No payment attempt for key {}", idempotency_key)))?;

    if let Some(ref business_id) = attempt.business_id {
        let business = queries::get_business(&tx, business_id)?.or_not_found(msg::BUSINESS_NOT_FOUND)?;
        let subscription = queries::get_subscription(&tx, &business.subscription_id)?
            .or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
        return Ok(Activation {
            subscription,
            business,
        });
    }

    let activation = activate(&tx, catalog, &attempt.user_id, plan_name, payment)?;
    if !queries::try_link_payment_attempt_business(&tx, &attempt.id, &activation.business.id)? {
        // dropping the transaction rolls the activation back
        return Err(AppError::Conflict(msg::PAYMENT_IN_PROGRESS.into()));
    }
    tx.commit()?;
    Ok(activation)
}

/// Point the user's resume token at the new business, starting a wizard if
/// none is in progress.
fn hand_to_wizard(
    conn: &Connection,
    catalog: &PlanCatalog,
    user_id: &str,
    plan_name: &str,
    business_id: &str,
) -> Result<()> {
    let existing = queries::get_resume_token(conn, user_id)?
        .filter(|t| !t.submitted)
        .and_then(|t| ListingWizard::resume(t, catalog).ok())
        .filter(|w| w.business_id().is_none() && w.plan_name().eq_ignore_ascii_case(plan_name));

    let mut wizard = match existing {
        Some(wizard) => wizard,
        None => {
            let plan = catalog.resolve(plan_name).or_not_found(msg::PLAN_NOT_FOUND)?;
            ListingWizard::new(plan, true)
        }
    };
    wizard.mark_payment_completed(business_id.to_string());
    queries::save_resume_token(conn, user_id, &wizard.to_resume())
}

/// Write the wizard's form onto a business and activate it. The business
/// must belong to `owner_id` and its subscription must be active.
pub fn complete_listing(
    conn: &Connection,
    owner_id: &str,
    business_id: &str,
    form: &WizardFormData,
) -> Result<Business> {
    let business = queries::get_business(conn, business_id)?.or_not_found(msg::BUSINESS_NOT_FOUND)?;
    if business.owner_id != owner_id {
        return Err(AppError::Forbidden(msg::NOT_BUSINESS_OWNER.into()));
    }

    let subscription = queries::get_subscription(conn, &business.subscription_id)?
        .or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
    if subscription.status != SubscriptionStatus::Active {
        return Err(AppError::Conflict(msg::SUBSCRIPTION_NOT_ACTIVE.into()));
    }

    queries::complete_business_listing(conn, business_id, form)?.or_not_found(msg::BUSINESS_NOT_FOUND)
}

/// Business and subscription a plan change would apply to.
pub fn upgrade_target(
    conn: &Connection,
    owner_id: &str,
    business_id: &str,
) -> Result<(Business, Subscription)> {
    let business = queries::get_business(conn, business_id)?.or_not_found(msg::BUSINESS_NOT_FOUND)?;
    if business.owner_id != owner_id {
        return Err(AppError::Forbidden(msg::NOT_BUSINESS_OWNER.into()));
    }
    let subscription = queries::get_subscription(conn, &business.subscription_id)?
        .or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
    if subscription.status.is_terminal() {
        return Err(AppError::Conflict(msg::SUBSCRIPTION_CANCELLED.into()));
    }
    Ok((business, subscription))
}

/// Move a listing's subscription to a new plan after a settled upgrade.
pub fn change_plan(
    conn: &Connection,
    owner_id: &str,
    business_id: &str,
    new_plan_name: &str,
    payment: &PaymentResult,
) -> Result<Subscription> {
    if !payment.success() {
        return Err(AppError::PaymentFailed(
            payment.error().unwrap_or(msg::PAYMENT_PROCESSING_FAILED).to_string(),
        ));
    }

    let (_, subscription) = upgrade_target(conn, owner_id, business_id)?;
    let plan = queries::get_stored_plan_by_name(conn, new_plan_name)?.or_not_found(msg::PLAN_NOT_FOUND)?;

    let provider = (!payment.free_transaction()).then(|| payment.provider().as_str());
    let updated = queries::update_subscription_plan(
        conn,
        &subscription.id,
        &plan.id,
        provider,
        payment.transaction_id(),
    )?
    .or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;

    tracing::info!(
        "Subscription {} moved from {} to {}{}",
        updated.id,
        subscription.plan_id,
        plan.id,
        if payment.is_downgrade() { " (downgrade)" } else { "" }
    );
    Ok(updated)
}

/// Cancel a subscription and take its listing offline. Cancelling twice is
/// a no-op.
pub fn cancel_subscription(conn: &Connection, owner_id: &str, subscription_id: &str) -> Result<Subscription> {
    let subscription = queries::get_subscription(conn, subscription_id)?
        .or_not_found(msg::SUBSCRIPTION_NOT_FOUND)?;
    if subscription.user_id != owner_id {
        return Err(AppError::Forbidden(msg::NOT_SUBSCRIPTION_OWNER.into()));
    }
    if subscription.status.is_terminal() {
        return Ok(subscription);
    }

    queries::set_subscription_status(conn, subscription_id, SubscriptionStatus::Cancelled)?;
    if let Some(business) = queries::get_business_for_subscription(conn, subscription_id)? {
        queries::set_business_active(conn, &business.id, false)?;
    }
    tracing::info!("Subscription {} cancelled", subscription_id);

    queries::get_subscription(conn, subscription_id)?.or_not_found(msg::SUBSCRIPTION_NOT_FOUND)
}
