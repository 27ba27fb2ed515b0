//! Discount codes, automatic promotions, and price math.
//!
//! All money math is done in `f64` currency units and rounded to cents
//! after every recalculation. `PriceQuote` always recomputes from the base
//! price, so removing a discount restores the plan price exactly.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::PlanCatalog;
use crate::db::{DbPool, queries};
use crate::error::{AppError, msg};
use crate::models::{DiscountCode, DiscountType, Promotion};

/// Trim and upper-case a user-entered code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Discounted amount, floored at zero and rounded to cents.
pub fn apply_discount(amount: f64, discount_type: DiscountType, value: f64) -> f64 {
    let discounted = match discount_type {
        DiscountType::Percentage => amount - amount * value / 100.0,
        DiscountType::Fixed => amount - value,
    };
    round2(discounted.max(0.0))
}

/// Amount in minor units (cents) as sent to the gateways.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// A discount that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedDiscount {
    /// Discount code id or promotion id
    pub discount_id: String,
    /// Normalized code; None for automatic promotions
    pub code: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub label: String,
}

impl AppliedDiscount {
    fn from_code(code: &DiscountCode) -> Self {
        let label = match code.discount_type {
            DiscountType::Percentage => format!("{}% off", code.discount_value),
            DiscountType::Fixed => format!("${:.2} off", code.discount_value),
        };
        Self {
            discount_id: code.id.clone(),
            code: Some(code.code.clone()),
            discount_type: code.discount_type,
            discount_value: code.discount_value,
            label,
        }
    }

    fn from_promotion(promotion: &Promotion) -> Self {
        Self {
            discount_id: promotion.id.clone(),
            code: None,
            discount_type: promotion.discount_type,
            discount_value: promotion.discount_value,
            label: promotion.name.clone(),
        }
    }
}

/// Why a code was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountRejection {
    Empty,
    NotFound,
    Inactive,
    Expired,
    NotYetValid,
    NotApplicable,
    Exhausted,
}

impl DiscountRejection {
    pub fn message(&self) -> &'static str {
        match self {
            DiscountRejection::Empty => msg::DISCOUNT_CODE_EMPTY,
            DiscountRejection::NotFound => "Invalid discount code",
            DiscountRejection::Inactive => "This discount code is no longer active",
            DiscountRejection::Expired => "This discount code has expired",
            DiscountRejection::NotYetValid => "This discount code is not valid yet",
            DiscountRejection::NotApplicable => "This discount code does not apply to the selected plan",
            DiscountRejection::Exhausted => "This discount code has reached its usage limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscountOutcome {
    Applied(AppliedDiscount),
    Rejected(DiscountRejection),
}

/// Lookup failure, distinct from a code that was checked and rejected.
#[derive(Debug, Error)]
pub enum DiscountError {
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    #[error("discount store unavailable: {0}")]
    Store(#[from] AppError),
}

impl From<DiscountError> for AppError {
    fn from(err: DiscountError) -> Self {
        match err {
            DiscountError::UnknownPlan(_) => AppError::NotFound(msg::PLAN_NOT_FOUND.into()),
            DiscountError::Store(e) => {
                tracing::error!("Discount lookup failed: {}", e);
                AppError::Unavailable(msg::DISCOUNT_UNAVAILABLE.into())
            }
        }
    }
}

impl From<r2d2::Error> for DiscountError {
    fn from(e: r2d2::Error) -> Self {
        DiscountError::Store(e.into())
    }
}

/// Wire shape of a validation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DiscountInfo {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<DiscountType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_id: Option<String>,
    pub message: String,
}

impl From<&DiscountOutcome> for DiscountInfo {
    fn from(outcome: &DiscountOutcome) -> Self {
        match outcome {
            DiscountOutcome::Applied(d) => DiscountInfo {
                valid: true,
                discount_type: Some(d.discount_type),
                discount_value: Some(d.discount_value),
                discount_id: Some(d.discount_id.clone()),
                message: format!("Discount applied: {}", d.label),
            },
            DiscountOutcome::Rejected(reason) => DiscountInfo {
                valid: false,
                discount_type: None,
                discount_value: None,
                discount_id: None,
                message: reason.message().to_string(),
            },
        }
    }
}

/// Check a code's own rules against a plan id at `now`.
fn evaluate(code: &DiscountCode, plan_id: &str, now: i64) -> DiscountOutcome {
    let rejection = if !code.is_active {
        Some(DiscountRejection::Inactive)
    } else if code.starts_at.is_some_and(|start| start > now) {
        Some(DiscountRejection::NotYetValid)
    } else if code.expires_at.is_some_and(|end| end <= now) {
        Some(DiscountRejection::Expired)
    } else if !code.plan_ids.is_empty() && !code.plan_ids.iter().any(|p| p == plan_id) {
        Some(DiscountRejection::NotApplicable)
    } else if code.max_uses.is_some_and(|max| code.used_count >= max) {
        Some(DiscountRejection::Exhausted)
    } else {
        None
    };

    match rejection {
        Some(reason) => DiscountOutcome::Rejected(reason),
        None => DiscountOutcome::Applied(AppliedDiscount::from_code(code)),
    }
}

#[derive(Clone)]
pub struct DiscountResolver {
    db: DbPool,
    catalog: Arc<PlanCatalog>,
}

impl DiscountResolver {
    pub fn new(db: DbPool, catalog: Arc<PlanCatalog>) -> Self {
        Self { db, catalog }
    }

    fn plan_id(&self, plan_name: &str) -> Result<&'static str, DiscountError> {
        self.catalog
            .resolve(plan_name)
            .map(|p| p.id)
            .ok_or_else(|| DiscountError::UnknownPlan(plan_name.to_string()))
    }

    /// Validate a user-entered code for a plan.
    pub fn apply_code(&self, code: &str, plan_name: &str) -> Result<DiscountOutcome, DiscountError> {
        let plan_id = self.plan_id(plan_name)?;
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(DiscountOutcome::Rejected(DiscountRejection::Empty));
        }

        let conn = self.db.get()?;
        let Some(stored) = queries::get_discount_code(&conn, &code)? else {
            return Ok(DiscountOutcome::Rejected(DiscountRejection::NotFound));
        };

        let outcome = evaluate(&stored, plan_id, chrono::Utc::now().timestamp());
        if let DiscountOutcome::Rejected(reason) = &outcome {
            tracing::debug!("Discount code {} rejected: {:?}", code, reason);
        }
        Ok(outcome)
    }

    /// Promotion currently running for a plan, used when no code is given.
    pub fn active_promotion_for_plan(
        &self,
        plan_name: &str,
    ) -> Result<Option<AppliedDiscount>, DiscountError> {
        let plan_id = self.plan_id(plan_name)?;
        let conn = self.db.get()?;
        let promotion =
            queries::get_active_promotion_for_plan(&conn, plan_id, chrono::Utc::now().timestamp())?;
        Ok(promotion.as_ref().map(AppliedDiscount::from_promotion))
    }

    /// Discount for a checkout: the code if one is given (rejections become
    /// `BadRequest`), otherwise any running promotion.
    pub fn resolve_for_checkout(
        &self,
        code: Option<&str>,
        plan_name: &str,
    ) -> crate::error::Result<Option<AppliedDiscount>> {
        match code.filter(|c| !c.trim().is_empty()) {
            Some(code) => match self.apply_code(code, plan_name)? {
                DiscountOutcome::Applied(discount) => Ok(Some(discount)),
                DiscountOutcome::Rejected(reason) => {
                    Err(AppError::BadRequest(reason.message().into()))
                }
            },
            None => Ok(self.active_promotion_for_plan(plan_name)?),
        }
    }
}

/// Price of one plan with at most one discount applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    base_price: f64,
    discount: Option<AppliedDiscount>,
    amount: f64,
}

impl PriceQuote {
    pub fn new(base_price: f64) -> Self {
        Self {
            base_price,
            discount: None,
            amount: round2(base_price.max(0.0)),
        }
    }

    /// Replace any current discount and recompute from the base price.
    pub fn apply(&mut self, discount: AppliedDiscount) {
        self.amount = apply_discount(self.base_price, discount.discount_type, discount.discount_value);
        self.discount = Some(discount);
    }

    /// Clear the discount locally. Usage counters are not touched.
    pub fn remove_code(&mut self) {
        self.discount = None;
        self.amount = round2(self.base_price.max(0.0));
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn amount_cents(&self) -> i64 {
        to_minor_units(self.amount)
    }

    pub fn discount(&self) -> Option<&AppliedDiscount> {
        self.discount.as_ref()
    }

    pub fn is_free(&self) -> bool {
        self.amount_cents() == 0
    }
}
