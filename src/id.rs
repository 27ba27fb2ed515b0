//! Prefixed ID generation for bizlist entities.
//!
//! All IDs use a `bl_` brand prefix so they never collide with payment
//! provider IDs (Stripe's `cs_`, `cus_`, `pi_`, gateway transaction ids).
//!
//! Format: `bl_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &[
    "bl_usr_", "bl_biz_", "bl_sub_", "bl_dsc_", "bl_promo_", "bl_pay_",
];

/// Validate that a string is a valid bizlist prefixed ID.
///
/// Rejects garbage before it reaches the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    User,
    Business,
    Subscription,
    DiscountCode,
    Promotion,
    PaymentAttempt,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "bl_usr",
            Self::Business => "bl_biz",
            Self::Subscription => "bl_sub",
            Self::DiscountCode => "bl_dsc",
            Self::Promotion => "bl_promo",
            Self::PaymentAttempt => "bl_pay",
        }
    }

    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
