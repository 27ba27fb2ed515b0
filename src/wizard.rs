//! Multi-step listing wizard.
//!
//! Steps: optional `payment` (until paid), `info`, `location`, `media`,
//! optional `premium_features` (Enhanced and VIP), `summary`. Moving forward
//! validates the current step; moving back never does. Submitting from the
//! summary writes the listing and activates the business.

use rusqlite::Connection;
use thiserror::Error;

use crate::activation;
use crate::catalog::{PlanCatalog, PlanConfig, PlanTier};
use crate::error::{AppError, msg};
use crate::models::{
    Business, FormPatch, RESUME_TOKEN_VERSION, ResumeToken, WizardFormData, WizardStep,
    is_valid_email,
};

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("{0}")]
    Invalid(String),

    #[error("Listing can only be submitted from the summary step")]
    NotOnSummary,

    #[error("Listing has already been submitted")]
    AlreadySubmitted,

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<WizardError> for AppError {
    fn from(err: WizardError) -> Self {
        match err {
            WizardError::Invalid(message) => AppError::BadRequest(message),
            WizardError::NotOnSummary | WizardError::AlreadySubmitted => {
                AppError::Conflict(err.to_string())
            }
            WizardError::UnknownPlan(_) => AppError::NotFound(msg::PLAN_NOT_FOUND.into()),
            WizardError::Store(e) => e,
        }
    }
}

/// Step sequence for a plan tier and payment state.
pub fn steps_for(tier: PlanTier, payment_completed: bool) -> Vec<WizardStep> {
    let mut steps = Vec::with_capacity(6);
    if !payment_completed {
        steps.push(WizardStep::Payment);
    }
    steps.extend([WizardStep::Info, WizardStep::Location, WizardStep::Media]);
    if tier.has_premium_features() {
        steps.push(WizardStep::PremiumFeatures);
    }
    steps.push(WizardStep::Summary);
    steps
}

fn is_web_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn check_url(value: Option<&str>, label: &str) -> Result<(), WizardError> {
    match value {
        Some(url) if !is_web_url(url) => Err(WizardError::Invalid(format!(
            "{} must start with http:// or https://",
            label
        ))),
        _ => Ok(()),
    }
}

fn require(value: &Option<String>, message: &str) -> Result<(), WizardError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(WizardError::Invalid(message.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct ListingWizard {
    plan_name: String,
    plan_price: i64,
    tier: PlanTier,
    payment_completed: bool,
    business_id: Option<String>,
    steps: Vec<WizardStep>,
    current: WizardStep,
    form: WizardFormData,
    error: Option<String>,
    submitted: bool,
}

impl ListingWizard {
    pub fn new(plan: &PlanConfig, payment_completed: bool) -> Self {
        let steps = steps_for(plan.tier, payment_completed);
        Self {
            plan_name: plan.name.to_string(),
            plan_price: plan.price,
            tier: plan.tier,
            payment_completed,
            business_id: None,
            current: steps[0],
            steps,
            form: WizardFormData::default(),
            error: None,
            submitted: false,
        }
    }

    /// Rebuild a wizard from its persisted token.
    pub fn resume(token: ResumeToken, catalog: &PlanCatalog) -> Result<Self, WizardError> {
        let plan = catalog
            .by_name(&token.plan_name)
            .ok_or_else(|| WizardError::UnknownPlan(token.plan_name.clone()))?;

        let mut wizard = Self::new(plan, token.payment_completed);
        wizard.business_id = token.business_id;
        wizard.form = token.form;
        wizard.submitted = token.submitted;
        if wizard.steps.contains(&token.current_step) {
            wizard.current = token.current_step;
        }
        Ok(wizard)
    }

    pub fn to_resume(&self) -> ResumeToken {
        ResumeToken {
            version: RESUME_TOKEN_VERSION,
            plan_name: self.plan_name.clone(),
            plan_price: self.plan_price,
            payment_completed: self.payment_completed,
            business_id: self.business_id.clone(),
            current_step: self.current,
            form: self.form.clone(),
            submitted: self.submitted,
        }
    }

    /// Resume an unfinished listing from its placeholder business row.
    pub fn hydrate(&mut self, business: &Business) {
        self.business_id = Some(business.id.clone());
        self.payment_completed = true;
        self.form = business.to_form();
        self.recompute_steps();
    }

    pub fn plan_name(&self) -> &str {
        &self.plan_name
    }

    pub fn plan_price(&self) -> i64 {
        self.plan_price
    }

    pub fn current_step(&self) -> WizardStep {
        self.current
    }

    pub fn steps(&self) -> &[WizardStep] {
        &self.steps
    }

    pub fn form(&self) -> &WizardFormData {
        &self.form
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn business_id(&self) -> Option<&str> {
        self.business_id.as_deref()
    }

    pub fn payment_completed(&self) -> bool {
        self.payment_completed
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    fn index(&self) -> usize {
        self.steps
            .iter()
            .position(|s| *s == self.current)
            .unwrap_or(0)
    }

    fn recompute_steps(&mut self) {
        self.steps = steps_for(self.tier, self.payment_completed);
        if !self.steps.contains(&self.current) {
            self.current = self.steps[0];
        }
    }

    pub fn update_form(&mut self, patch: FormPatch) {
        self.form.apply(patch);
        self.error = None;
    }

    /// Payment went through and the placeholder business exists.
    pub fn mark_payment_completed(&mut self, business_id: String) {
        self.payment_completed = true;
        self.business_id = Some(business_id);
        self.error = None;
        self.recompute_steps();
    }

    pub fn validate_step(&self, step: WizardStep) -> Result<(), WizardError> {
        let form = &self.form;
        match step {
            WizardStep::Payment => {
                if !self.payment_completed {
                    return Err(WizardError::Invalid(
                        "Please complete payment to continue".into(),
                    ));
                }
            }
            WizardStep::Info => {
                require(&form.name, "Business name is required")?;
                require(&form.category, "Category is required")?;
            }
            WizardStep::Location => {
                if let Some(lat) = form.latitude
                    && !(-90.0..=90.0).contains(&lat)
                {
                    return Err(WizardError::Invalid(
                        "Latitude must be between -90 and 90".into(),
                    ));
                }
                if let Some(lng) = form.longitude
                    && !(-180.0..=180.0).contains(&lng)
                {
                    return Err(WizardError::Invalid(
                        "Longitude must be between -180 and 180".into(),
                    ));
                }
            }
            WizardStep::Media => {
                require(&form.email, msg::EMAIL_EMPTY)?;
                if !form.email.as_deref().is_some_and(is_valid_email) {
                    return Err(WizardError::Invalid(msg::INVALID_EMAIL_FORMAT.into()));
                }
                check_url(form.website.as_deref(), "Website")?;
                check_url(form.logo_url.as_deref(), "Logo URL")?;
                if form.image_urls.iter().any(|u| !is_web_url(u)) {
                    return Err(WizardError::Invalid(
                        "Image URLs must start with http:// or https://".into(),
                    ));
                }
                for (label, url) in form.social_links.entries() {
                    check_url(Some(url), &format!("{} link", label))?;
                }
            }
            WizardStep::PremiumFeatures => {
                check_url(form.premium.video_url.as_deref(), "Video URL")?;
                check_url(form.premium.booking_url.as_deref(), "Booking URL")?;
            }
            WizardStep::Summary => {}
        }
        Ok(())
    }

    /// Validate the current step and advance. On failure the step is
    /// unchanged and `error` is set. The summary is the last step.
    pub fn next(&mut self) -> Result<WizardStep, WizardError> {
        if let Err(e) = self.validate_step(self.current) {
            self.error = Some(e.to_string());
            return Err(e);
        }
        self.error = None;
        if let Some(next) = self.steps.get(self.index() + 1) {
            self.current = *next;
        }
        Ok(self.current)
    }

    pub fn previous(&mut self) -> WizardStep {
        self.error = None;
        let index = self.index();
        if index > 0 {
            self.current = self.steps[index - 1];
        }
        self.current
    }

    /// Write the listing and activate the business. Success is terminal;
    /// on failure the wizard stays on the summary with `error` set.
    pub fn submit(&mut self, conn: &Connection, owner_id: &str) -> Result<Business, WizardError> {
        if self.submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.current != WizardStep::Summary {
            return Err(WizardError::NotOnSummary);
        }

        let result = self.try_submit(conn, owner_id);
        match &result {
            Ok(business) => {
                self.submitted = true;
                self.error = None;
                tracing::info!("Listing {} submitted and activated", business.id);
            }
            Err(WizardError::Store(e)) => {
                tracing::error!("Listing submission failed: {}", e);
                self.error = Some(match e {
                    AppError::Conflict(message) | AppError::Forbidden(message) => message.clone(),
                    _ => "Failed to save your listing. Please try again.".into(),
                });
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        result
    }

    fn try_submit(&self, conn: &Connection, owner_id: &str) -> Result<Business, WizardError> {
        for step in &self.steps {
            self.validate_step(*step)?;
        }
        let business_id = self
            .business_id
            .as_deref()
            .ok_or_else(|| WizardError::Invalid("Please complete payment to continue".into()))?;
        Ok(activation::complete_listing(conn, owner_id, business_id, &self.form)?)
    }
}
