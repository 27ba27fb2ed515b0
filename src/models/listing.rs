//! Listing draft data carried through the wizard, and its resume token.

use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, EnumString};

/// Wizard steps in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WizardStep {
    Payment,
    Info,
    Location,
    Media,
    PremiumFeatures,
    Summary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialLinks {
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub twitter: Option<String>,
    pub linkedin: Option<String>,
    pub youtube: Option<String>,
}

impl SocialLinks {
    /// (label, url) pairs for every link that is set.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("Facebook", &self.facebook),
            ("Instagram", &self.instagram),
            ("Twitter", &self.twitter),
            ("LinkedIn", &self.linkedin),
            ("YouTube", &self.youtube),
        ]
        .into_iter()
        .filter_map(|(label, url)| url.as_deref().map(|u| (label, u)))
        .collect()
    }
}

/// Fields only shown to Enhanced and VIP listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PremiumFeatures {
    pub video_url: Option<String>,
    pub booking_url: Option<String>,
    pub coupon_title: Option<String>,
    pub coupon_description: Option<String>,
    pub highlights: Vec<String>,
}

/// Draft of every business field the wizard collects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardFormData {
    // info
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    // location
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    // media & contact
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub image_urls: Vec<String>,
    pub social_links: SocialLinks,
    // premium
    pub premium: PremiumFeatures,
}

/// Double option for patch fields:
/// - absent → None (leave as is)
/// - null → Some(None) (clear)
/// - value → Some(Some(value))
fn deserialize_optional_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(Some(value))
}

/// Partial update to a draft. Absent fields are left untouched; blank
/// strings clear text fields and `null` clears coordinates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormPatch {
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_nullable")]
    pub latitude: Option<Option<f64>>,
    #[serde(deserialize_with = "deserialize_optional_nullable")]
    pub longitude: Option<Option<f64>>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub social_links: Option<SocialLinks>,
    pub premium: Option<PremiumFeatures>,
}

fn merge_text(target: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value {
        let trimmed = v.trim();
        *target = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

impl WizardFormData {
    pub fn apply(&mut self, patch: FormPatch) {
        merge_text(&mut self.name, patch.name);
        merge_text(&mut self.tagline, patch.tagline);
        merge_text(&mut self.description, patch.description);
        merge_text(&mut self.category, patch.category);
        if let Some(tags) = patch.tags {
            self.tags = clean_list(tags);
        }
        merge_text(&mut self.address, patch.address);
        merge_text(&mut self.city, patch.city);
        merge_text(&mut self.state, patch.state);
        merge_text(&mut self.zip_code, patch.zip_code);
        if let Some(latitude) = patch.latitude {
            self.latitude = latitude;
        }
        if let Some(longitude) = patch.longitude {
            self.longitude = longitude;
        }
        merge_text(&mut self.phone, patch.phone);
        merge_text(&mut self.email, patch.email);
        merge_text(&mut self.website, patch.website);
        merge_text(&mut self.logo_url, patch.logo_url);
        if let Some(urls) = patch.image_urls {
            self.image_urls = clean_list(urls);
        }
        if let Some(links) = patch.social_links {
            self.social_links = links;
        }
        if let Some(premium) = patch.premium {
            self.premium = premium;
        }
    }
}

/// Current `ResumeToken` layout. Tokens with another version are discarded.
pub const RESUME_TOKEN_VERSION: u32 = 1;

/// Everything needed to resume a listing after a reload or a checkout
/// redirect. Persisted as a single row so it is never partially written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub version: u32,
    pub plan_name: String,
    pub plan_price: i64,
    pub payment_completed: bool,
    pub business_id: Option<String>,
    pub current_step: WizardStep,
    pub form: WizardFormData,
    /// Set once the listing was written and activated
    pub submitted: bool,
}
