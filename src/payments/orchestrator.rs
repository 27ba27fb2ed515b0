use std::future::Future;
use std::sync::Arc;

use rusqlite::ErrorCode;
use serde::Serialize;

use crate::catalog::PlanCatalog;
use crate::db::{DbPool, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::models::{AttemptKind, AttemptStatus, CreatePaymentAttempt, PaymentAttempt};

use super::{
    CardData, ChargeRequest, CheckoutRequest, DirectCharge, GatewayError, HostedCheckout,
    PaymentError, PaymentOptions, PaymentResult, Provider, UpgradeOptions, UpgradeRequest,
};

/// What the ledger says about an idempotency key.
enum AttemptStart {
    /// Proceed with the gateway call.
    Proceed(PaymentAttempt),
    /// Already succeeded; return the recorded result.
    Replay(PaymentResult),
    /// Another request holds this key.
    Busy,
}

/// Routes payments to the selected gateway and keeps the attempt ledger.
///
/// Store access happens between gateway calls, never across them.
pub struct PaymentOrchestrator {
    db: DbPool,
    catalog: Arc<PlanCatalog>,
    hosted: Arc<dyn HostedCheckout>,
    direct: Arc<dyn DirectCharge>,
    currency: String,
}

impl PaymentOrchestrator {
    pub fn new(
        db: DbPool,
        catalog: Arc<PlanCatalog>,
        hosted: Arc<dyn HostedCheckout>,
        direct: Arc<dyn DirectCharge>,
        currency: String,
    ) -> Self {
        Self {
            db,
            catalog,
            hosted,
            direct,
            currency,
        }
    }

    /// Start a payment with the provider named in `options`.
    ///
    /// Zero amounts succeed as free transactions without contacting a
    /// gateway. Stripe returns a redirect URL. EcomPayments only returns a
    /// marker; the caller continues with `charge_direct`.
    pub async fn create_session(&self, user_id: &str, options: &PaymentOptions) -> Result<PaymentResult> {
        if options.amount_cents() == 0 {
            return self.record_free(user_id, AttemptKind::Checkout, options, None);
        }

        match options.provider {
            Provider::EcomPayments => Ok(PaymentResult::awaiting_card(Provider::EcomPayments)),
            Provider::Stripe => {
                let attempt = match self.begin_attempt(user_id, AttemptKind::Checkout, options, None)? {
                    AttemptStart::Proceed(attempt) => attempt,
                    AttemptStart::Replay(result) => return Ok(result),
                    AttemptStart::Busy => {
                        return Ok(PaymentResult::failed(Provider::Stripe, msg::PAYMENT_IN_PROGRESS));
                    }
                };

                let request = CheckoutRequest {
                    product_name: options.plan_name.clone(),
                    amount_cents: attempt.amount_cents,
                    currency: self.currency.clone(),
                    customer_email: options.customer_email.clone(),
                    success_url: options.success_url.clone(),
                    cancel_url: options.cancel_url.clone(),
                    metadata: checkout_metadata(&attempt, options),
                    idempotency_key: options.idempotency_key.clone(),
                };

                self.send_checkout(&attempt, &request).await
            }
        }
    }

    /// Charge a card through the direct gateway.
    ///
    /// Card details are validated locally first. A key whose attempt already
    /// succeeded returns the recorded result without charging again.
    pub async fn charge_direct(
        &self,
        user_id: &str,
        options: &PaymentOptions,
        card: &CardData,
    ) -> Result<PaymentResult> {
        let provider = Provider::EcomPayments;
        if options.amount_cents() == 0 {
            return self.record_free(user_id, AttemptKind::Charge, options, None);
        }
        if let Err(reason) = card.validate() {
            return Ok(PaymentResult::failed(provider, reason));
        }

        let attempt = match self.begin_attempt(user_id, AttemptKind::Charge, options, None)? {
            AttemptStart::Proceed(attempt) => attempt,
            AttemptStart::Replay(result) => return Ok(result),
            AttemptStart::Busy => return Ok(PaymentResult::failed(provider, msg::PAYMENT_IN_PROGRESS)),
        };

        let request = ChargeRequest {
            amount_cents: attempt.amount_cents,
            currency: self.currency.clone(),
            card: card.clone(),
            description: format!("{} (annual)", options.plan_name),
            customer_email: options.customer_email.clone(),
            metadata: options.metadata.clone(),
            idempotency_key: options.idempotency_key.clone(),
        };

        match self.direct.charge(&request).await {
            Ok(receipt) => {
                self.succeed_attempt(&attempt, Some(&receipt.transaction_id), false)?;
                tracing::info!(
                    "Charged {} cents for {} (attempt {})",
                    attempt.amount_cents,
                    options.plan_name,
                    attempt.id
                );
                Ok(PaymentResult::charged(provider, receipt.transaction_id))
            }
            Err(err) => self.fail_attempt(&attempt, provider, &err),
        }
    }

    /// Move an existing listing to another plan.
    ///
    /// Stripe returns a checkout URL whose return link carries the business
    /// id. The direct gateway charges the card and may answer with a
    /// downgrade instead of a transaction.
    pub async fn upgrade_plan(
        &self,
        user_id: &str,
        options: &UpgradeOptions,
        card: Option<&CardData>,
    ) -> Result<PaymentResult> {
        let payment = &options.payment;
        let business_id = Some(options.business_id.as_str());
        if payment.amount_cents() == 0 {
            return self.record_free(user_id, AttemptKind::Upgrade, payment, business_id);
        }

        match payment.provider {
            Provider::Stripe => {
                let attempt = match self.begin_attempt(user_id, AttemptKind::Upgrade, payment, business_id)? {
                    AttemptStart::Proceed(attempt) => attempt,
                    AttemptStart::Replay(result) => return Ok(result),
                    AttemptStart::Busy => {
                        return Ok(PaymentResult::failed(Provider::Stripe, msg::PAYMENT_IN_PROGRESS));
                    }
                };

                let mut metadata = checkout_metadata(&attempt, payment);
                metadata.push(("mode".into(), "upgrade".into()));
                metadata.push(("business_id".into(), options.business_id.clone()));
                metadata.push(("current_plan".into(), options.current_plan_name.clone()));

                let request = CheckoutRequest {
                    product_name: format!("Upgrade to {}", payment.plan_name),
                    amount_cents: attempt.amount_cents,
                    currency: self.currency.clone(),
                    customer_email: payment.customer_email.clone(),
                    success_url: payment.success_url.clone(),
                    cancel_url: payment.cancel_url.clone(),
                    metadata,
                    idempotency_key: payment.idempotency_key.clone(),
                };

                self.send_checkout(&attempt, &request).await
            }
            Provider::EcomPayments => {
                let provider = Provider::EcomPayments;
                let Some(card) = card else {
                    return Ok(PaymentResult::failed(provider, msg::CARD_REQUIRED));
                };
                if let Err(reason) = card.validate() {
                    return Ok(PaymentResult::failed(provider, reason));
                }

                let attempt = match self.begin_attempt(user_id, AttemptKind::Upgrade, payment, business_id)? {
                    AttemptStart::Proceed(attempt) => attempt,
                    AttemptStart::Replay(result) => return Ok(result),
                    AttemptStart::Busy => {
                        return Ok(PaymentResult::failed(provider, msg::PAYMENT_IN_PROGRESS));
                    }
                };

                let request = UpgradeRequest {
                    business_id: options.business_id.clone(),
                    current_plan: options.current_plan_name.clone(),
                    new_plan: payment.plan_name.clone(),
                    amount_cents: attempt.amount_cents,
                    currency: self.currency.clone(),
                    card: card.clone(),
                    idempotency_key: payment.idempotency_key.clone(),
                };

                match self.direct.upgrade(&request).await {
                    Ok(receipt) => {
                        self.succeed_attempt(
                            &attempt,
                            receipt.transaction_id.as_deref(),
                            receipt.is_downgrade,
                        )?;
                        Ok(PaymentResult::upgraded(
                            provider,
                            receipt.transaction_id,
                            receipt.is_downgrade,
                        ))
                    }
                    Err(err) => self.fail_attempt(&attempt, provider, &err),
                }
            }
        }
    }

    /// Ask the hosted provider whether a returned checkout session was paid,
    /// and mark its attempt succeeded. Returns the updated attempt.
    pub async fn confirm_checkout(&self, session_id: &str) -> Result<PaymentAttempt> {
        let attempt = {
            let conn = self.db.get()?;
            queries::get_payment_attempt_by_session(&conn, session_id)?
                .or_not_found(msg::CHECKOUT_SESSION_UNKNOWN)?
        };

        if attempt.status == AttemptStatus::Succeeded {
            return Ok(attempt);
        }

        match self.hosted.session_paid(session_id).await {
            Ok(true) => {
                self.succeed_attempt(&attempt, Some(session_id), false)?;
                let conn = self.db.get()?;
                queries::get_payment_attempt_by_key(&conn, &attempt.idempotency_key)?
                    .or_not_found(msg::CHECKOUT_SESSION_UNKNOWN)
            }
            Ok(false) => Err(AppError::PaymentFailed(msg::CHECKOUT_NOT_PAID.into())),
            Err(err) => {
                tracing::warn!("Could not confirm checkout session {}: {}", session_id, err);
                match PaymentError::classify(&err) {
                    PaymentError::ServiceUnavailable | PaymentError::Network | PaymentError::OutcomeUnknown => {
                        Err(AppError::Unavailable(PaymentError::ServiceUnavailable.user_message()))
                    }
                    other => Err(AppError::PaymentFailed(other.user_message())),
                }
            }
        }
    }

    fn plan_id(&self, plan_name: &str) -> Result<&'static str> {
        self.catalog
            .resolve(plan_name)
            .map(|p| p.id)
            .or_not_found(msg::PLAN_NOT_FOUND)
    }

    fn begin_attempt(
        &self,
        user_id: &str,
        kind: AttemptKind,
        options: &PaymentOptions,
        business_id: Option<&str>,
    ) -> Result<AttemptStart> {
        let plan_id = self.plan_id(&options.plan_name)?;
        let amount_cents = options.amount_cents();
        let conn = self.db.get()?;

        if let Some(existing) = queries::get_payment_attempt_by_key(&conn, &options.idempotency_key)? {
            if existing.user_id != user_id
                || existing.kind != kind
                || existing.plan_id != plan_id
                || existing.amount_cents != amount_cents
            {
                return Err(AppError::Conflict(msg::IDEMPOTENCY_KEY_REUSED.into()));
            }

            return Ok(match existing.status {
                AttemptStatus::Succeeded => {
                    tracing::info!("Replaying recorded result for attempt {}", existing.id);
                    AttemptStart::Replay(replay(&existing))
                }
                // hosted checkout creation is idempotent on the provider side
                AttemptStatus::Pending if kind != AttemptKind::Charge && existing.provider == Provider::Stripe.as_str() => {
                    AttemptStart::Proceed(existing)
                }
                AttemptStatus::Pending => AttemptStart::Busy,
                AttemptStatus::Failed | AttemptStatus::Unconfirmed => {
                    if queries::try_reopen_payment_attempt(&conn, &existing.id)? {
                        AttemptStart::Proceed(existing)
                    } else {
                        AttemptStart::Busy
                    }
                }
            });
        }

        let created = queries::create_payment_attempt(
            &conn,
            &CreatePaymentAttempt {
                idempotency_key: options.idempotency_key.clone(),
                user_id: user_id.to_string(),
                kind,
                provider: options.provider.as_str().to_string(),
                plan_id: plan_id.to_string(),
                amount_cents,
                discount_id: options.discount.as_ref().map(|d| d.discount_id.clone()),
                business_id: business_id.map(String::from),
            },
        );

        match created {
            Ok(attempt) => Ok(AttemptStart::Proceed(attempt)),
            Err(AppError::Database(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                // lost the insert race for this key
                Ok(AttemptStart::Busy)
            }
            Err(e) => Err(e),
        }
    }

    fn record_free(
        &self,
        user_id: &str,
        kind: AttemptKind,
        options: &PaymentOptions,
        business_id: Option<&str>,
    ) -> Result<PaymentResult> {
        let attempt = match self.begin_attempt(user_id, kind, options, business_id)? {
            AttemptStart::Proceed(attempt) => attempt,
            AttemptStart::Replay(result) => return Ok(result),
            AttemptStart::Busy => {
                return Ok(PaymentResult::failed(options.provider, msg::PAYMENT_IN_PROGRESS));
            }
        };
        self.succeed_attempt(&attempt, None, false)?;
        tracing::info!("Free {} for {} (attempt {})", kind.as_ref(), options.plan_name, attempt.id);
        Ok(PaymentResult::free(options.provider))
    }

    async fn send_checkout(
        &self,
        attempt: &PaymentAttempt,
        request: &CheckoutRequest,
    ) -> Result<PaymentResult> {
        match self.hosted.create_checkout_session(request).await {
            Ok(session) => {
                let conn = self.db.get()?;
                queries::set_payment_attempt_session(&conn, &attempt.id, &session.id)?;
                Ok(PaymentResult::redirect(Provider::Stripe, session.url))
            }
            Err(err) => self.fail_attempt(attempt, Provider::Stripe, &err),
        }
    }

    fn succeed_attempt(
        &self,
        attempt: &PaymentAttempt,
        transaction_id: Option<&str>,
        is_downgrade: bool,
    ) -> Result<()> {
        let conn = self.db.get()?;
        queries::finish_payment_attempt(
            &conn,
            &attempt.id,
            AttemptStatus::Succeeded,
            transaction_id,
            is_downgrade,
            None,
        )?;

        if let Some(ref discount_id) = attempt.discount_id
            && discount_id.starts_with(crate::id::EntityType::DiscountCode.prefix())
            && !queries::increment_discount_usage(&conn, discount_id)?
        {
            tracing::warn!(
                "Discount {} was over its usage limit when attempt {} settled",
                discount_id,
                attempt.id
            );
        }
        Ok(())
    }

    fn fail_attempt(
        &self,
        attempt: &PaymentAttempt,
        provider: Provider,
        err: &GatewayError,
    ) -> Result<PaymentResult> {
        let classified = PaymentError::classify(err);
        tracing::warn!(
            "{} payment attempt {} failed: {} ({:?})",
            provider,
            attempt.id,
            err,
            classified
        );

        let (status, result) = match classified {
            PaymentError::OutcomeUnknown => {
                (AttemptStatus::Unconfirmed, PaymentResult::unconfirmed(provider))
            }
            other => (
                AttemptStatus::Failed,
                PaymentResult::failed(provider, other.user_message()),
            ),
        };

        let conn = self.db.get()?;
        queries::finish_payment_attempt(
            &conn,
            &attempt.id,
            status,
            None,
            false,
            Some(&err.to_string()),
        )?;
        Ok(result)
    }
}

fn checkout_metadata(attempt: &PaymentAttempt, options: &PaymentOptions) -> Vec<(String, String)> {
    let mut metadata = vec![
        ("attempt_id".to_string(), attempt.id.clone()),
        ("plan".to_string(), options.plan_name.clone()),
    ];
    if let Some(ref discount) = options.discount {
        metadata.push(("discount_id".into(), discount.discount_id.clone()));
    }
    if let serde_json::Value::Object(ref extra) = options.metadata {
        for (key, value) in extra {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            metadata.push((key.clone(), value));
        }
    }
    metadata
}

/// Rebuild the result of a settled attempt.
fn replay(attempt: &PaymentAttempt) -> PaymentResult {
    let provider = attempt.provider.parse().unwrap_or(Provider::EcomPayments);
    if attempt.amount_cents == 0 {
        return PaymentResult::free(provider);
    }
    match attempt.kind {
        AttemptKind::Upgrade => {
            PaymentResult::upgraded(provider, attempt.transaction_id.clone(), attempt.is_downgrade)
        }
        _ => match attempt.transaction_id.clone() {
            Some(tx) => PaymentResult::charged(provider, tx),
            None => PaymentResult::awaiting_card(provider),
        },
    }
}

/// Client-observable payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFlowState {
    Payment,
    Processing,
    Success,
    /// Gateway timed out; the charge may exist
    Unconfirmed,
}

/// Payment modal state machine: Payment → Processing → Success, falling
/// back to Payment with an error on failure.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentFlow {
    state: PaymentFlowState,
    error: Option<String>,
    result: Option<PaymentResult>,
}

impl Default for PaymentFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentFlow {
    pub fn new() -> Self {
        Self {
            state: PaymentFlowState::Payment,
            error: None,
            result: None,
        }
    }

    pub fn state(&self) -> PaymentFlowState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result(&self) -> Option<&PaymentResult> {
        self.result.as_ref()
    }

    /// Enter Processing. Refused while processing or after success.
    pub fn begin(&mut self) -> bool {
        match self.state {
            PaymentFlowState::Payment | PaymentFlowState::Unconfirmed => {
                self.state = PaymentFlowState::Processing;
                self.error = None;
                true
            }
            PaymentFlowState::Processing | PaymentFlowState::Success => false,
        }
    }

    pub fn finish(&mut self, result: PaymentResult) {
        self.state = if result.success() {
            PaymentFlowState::Success
        } else if result.outcome_unknown() {
            PaymentFlowState::Unconfirmed
        } else {
            PaymentFlowState::Payment
        };
        self.error = result.error().map(String::from);
        self.result = Some(result);
    }

    /// Drive one attempt through the flow.
    pub async fn run<F>(&mut self, attempt: F) -> Result<PaymentFlowState>
    where
        F: Future<Output = Result<PaymentResult>>,
    {
        if !self.begin() {
            return Err(AppError::Conflict(msg::PAYMENT_IN_PROGRESS.into()));
        }
        match attempt.await {
            Ok(result) => {
                self.finish(result);
                Ok(self.state)
            }
            Err(e) => {
                self.state = PaymentFlowState::Payment;
                self.error = Some(msg::PAYMENT_PROCESSING_FAILED.into());
                Err(e)
            }
        }
    }
}
