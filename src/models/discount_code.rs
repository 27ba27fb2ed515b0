use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// Promotional code row. Codes are stored upper-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    /// Plan ids the code applies to. Empty = every plan.
    pub plan_ids: Vec<String>,
    pub starts_at: Option<i64>,
    pub expires_at: Option<i64>,
    /// None = unlimited
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDiscountCode {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(default)]
    pub plan_ids: Vec<String>,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub max_uses: Option<i64>,
}

fn validate_value(discount_type: DiscountType, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::BadRequest("Discount value must be a non-negative number".into()));
    }
    if discount_type == DiscountType::Percentage && value > 100.0 {
        return Err(AppError::BadRequest("Percentage discount cannot exceed 100".into()));
    }
    Ok(())
}

impl CreateDiscountCode {
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(AppError::BadRequest("Discount code cannot be empty".into()));
        }
        validate_value(self.discount_type, self.discount_value)?;
        if let Some(max) = self.max_uses
            && max < 1
        {
            return Err(AppError::BadRequest("max_uses must be at least 1".into()));
        }
        Ok(())
    }
}

/// Automatic plan promotion, applied when no code is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub plan_id: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub starts_at: i64,
    pub ends_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePromotion {
    pub plan_id: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: Option<i64>,
}

impl CreatePromotion {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Promotion name cannot be empty".into()));
        }
        validate_value(self.discount_type, self.discount_value)?;
        if let Some(end) = self.ends_at
            && end <= self.starts_at
        {
            return Err(AppError::BadRequest("Promotion must end after it starts".into()));
        }
        Ok(())
    }
}
