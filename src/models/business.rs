use serde::{Deserialize, Serialize};

use super::listing::{PremiumFeatures, SocialLinks, WizardFormData};

/// Name given to the inactive row created right after payment.
pub const PENDING_BUSINESS_NAME: &str = "Pending Business Listing";

/// Directory entry. Starts inactive as a placeholder and is activated once
/// the wizard writes the full listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub owner_id: String,
    pub subscription_id: String,
    pub name: String,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub image_urls: Vec<String>,
    pub social_links: SocialLinks,
    pub premium: PremiumFeatures,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Business {
    pub fn is_placeholder(&self) -> bool {
        !self.is_active && self.name == PENDING_BUSINESS_NAME
    }

    /// Draft seeded from this row, for resuming an incomplete listing.
    pub fn to_form(&self) -> WizardFormData {
        WizardFormData {
            name: (self.name != PENDING_BUSINESS_NAME).then(|| self.name.clone()),
            tagline: self.tagline.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip_code: self.zip_code.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            phone: self.phone.clone(),
            email: self.email.clone(),
            website: self.website.clone(),
            logo_url: self.logo_url.clone(),
            image_urls: self.image_urls.clone(),
            social_links: self.social_links.clone(),
            premium: self.premium.clone(),
        }
    }
}
