//! Static plan catalog.
//!
//! Plans are fixed at process start and never mutated. The same table is
//! mirrored into `subscription_plans` at schema init so subscriptions can
//! reference a stored plan id.

use serde::Serialize;
use strum::{AsRefStr, EnumString};

/// Plan tier, ordered from cheapest to most featured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanTier {
    Starter,
    Enhanced,
    Vip,
}

impl PlanTier {
    /// Mid and top tier listings get the premium features wizard step.
    pub fn has_premium_features(&self) -> bool {
        matches!(self, PlanTier::Enhanced | PlanTier::Vip)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanConfig {
    pub id: &'static str,
    pub name: &'static str,
    pub tier: PlanTier,
    /// Annual price in whole currency units
    pub price: i64,
    pub description: &'static str,
    pub features: Vec<&'static str>,
    pub is_popular: bool,
    pub is_recommended: bool,
}

#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanConfig>,
}

impl PlanCatalog {
    pub fn standard() -> Self {
        Self {
            plans: vec![
                PlanConfig {
                    id: "starter",
                    name: "Starter Plan",
                    tier: PlanTier::Starter,
                    price: 20,
                    description: "Get your business listed in the directory",
                    features: vec![
                        "Business listing",
                        "Contact information",
                        "Business hours",
                        "Basic search visibility",
                    ],
                    is_popular: false,
                    is_recommended: false,
                },
                PlanConfig {
                    id: "enhanced",
                    name: "Enhanced Plan",
                    tier: PlanTier::Enhanced,
                    price: 60,
                    description: "Stand out with photos, social links and promotions",
                    features: vec![
                        "Everything in Starter",
                        "Photo gallery",
                        "Social media links",
                        "Coupons and promotions",
                        "Improved search placement",
                    ],
                    is_popular: true,
                    is_recommended: false,
                },
                PlanConfig {
                    id: "vip",
                    name: "VIP Plan",
                    tier: PlanTier::Vip,
                    price: 100,
                    description: "Maximum exposure for your business",
                    features: vec![
                        "Everything in Enhanced",
                        "Featured placement",
                        "Video showcase",
                        "Online booking link",
                        "Priority support",
                    ],
                    is_popular: false,
                    is_recommended: true,
                },
            ],
        }
    }

    pub fn plans(&self) -> &[PlanConfig] {
        &self.plans
    }

    /// Case-insensitive lookup by display name ("Enhanced Plan").
    pub fn by_name(&self, name: &str) -> Option<&PlanConfig> {
        let name = name.trim();
        self.plans.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn by_id(&self, id: &str) -> Option<&PlanConfig> {
        self.plans.iter().find(|p| p.id == id)
    }

    /// Lookup by either id or display name.
    pub fn resolve(&self, name_or_id: &str) -> Option<&PlanConfig> {
        self.by_id(name_or_id.trim())
            .or_else(|| self.by_name(name_or_id))
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
