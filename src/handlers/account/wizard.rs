use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::catalog::{PlanCatalog, PlanConfig};
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::middleware::UserContext;
use crate::models::{Business, FormPatch, WizardFormData, WizardStep};
use crate::wizard::{ListingWizard, WizardError};

#[derive(Debug, Deserialize)]
pub struct StartWizardRequest {
    /// Plan id or display name
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct WizardView {
    pub plan_name: String,
    pub plan_price: i64,
    pub current_step: WizardStep,
    pub steps: Vec<WizardStep>,
    pub payment_completed: bool,
    pub business_id: Option<String>,
    pub form: WizardFormData,
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<Business>,
}

impl From<&ListingWizard> for WizardView {
    fn from(wizard: &ListingWizard) -> Self {
        Self {
            plan_name: wizard.plan_name().to_string(),
            plan_price: wizard.plan_price(),
            current_step: wizard.current_step(),
            steps: wizard.steps().to_vec(),
            payment_completed: wizard.payment_completed(),
            business_id: wizard.business_id().map(String::from),
            form: wizard.form().clone(),
            submitted: wizard.is_submitted(),
            business: None,
        }
    }
}

fn load(conn: &Connection, catalog: &PlanCatalog, user_id: &str) -> Result<ListingWizard> {
    let token = queries::get_resume_token(conn, user_id)?.or_not_found(msg::WIZARD_NOT_FOUND)?;
    Ok(ListingWizard::resume(token, catalog)?)
}

fn load_open(conn: &Connection, catalog: &PlanCatalog, user_id: &str) -> Result<ListingWizard> {
    let wizard = load(conn, catalog, user_id)?;
    if wizard.is_submitted() {
        return Err(WizardError::AlreadySubmitted.into());
    }
    Ok(wizard)
}

fn save(conn: &Connection, user_id: &str, wizard: &ListingWizard) -> Result<()> {
    queries::save_resume_token(conn, user_id, &wizard.to_resume())
}

/// Unfinished placeholder business the user already paid for on `plan`.
fn placeholder_on_plan(conn: &Connection, user_id: &str, plan: &PlanConfig) -> Result<Option<Business>> {
    for business in queries::list_businesses_for_owner(conn, user_id)? {
        if !business.is_placeholder() {
            continue;
        }
        let on_plan = queries::get_subscription(conn, &business.subscription_id)?
            .is_some_and(|s| s.plan_id == plan.id && !s.status.is_terminal());
        if on_plan {
            return Ok(Some(business));
        }
    }
    Ok(None)
}

/// Start a listing for a plan. An unsubmitted draft for the same plan is
/// resumed as-is; otherwise an unfinished placeholder listing on the plan
/// is picked up instead of starting from scratch.
pub async fn start_wizard(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(request): Json<StartWizardRequest>,
) -> Result<Json<WizardView>> {
    let plan = state.catalog.resolve(&request.plan).or_not_found(msg::PLAN_NOT_FOUND)?;
    let conn = state.db.get()?;

    let draft = queries::get_resume_token(&conn, &ctx.user.id)?
        .filter(|t| !t.submitted)
        .and_then(|t| ListingWizard::resume(t, &state.catalog).ok())
        .filter(|w| w.plan_name() == plan.name);
    let placeholder = placeholder_on_plan(&conn, &ctx.user.id, plan)?;

    let wizard = match (draft, placeholder) {
        (Some(draft), Some(business)) if draft.business_id() == Some(business.id.as_str()) => draft,
        (Some(mut draft), Some(business)) if draft.business_id().is_none() => {
            draft.mark_payment_completed(business.id.clone());
            draft
        }
        (Some(draft), None) if draft.business_id().is_none() => draft,
        (_, Some(business)) => {
            tracing::debug!("Resuming placeholder business {}", business.id);
            let mut wizard = ListingWizard::new(plan, false);
            wizard.hydrate(&business);
            wizard
        }
        (_, None) => ListingWizard::new(plan, false),
    };

    save(&conn, &ctx.user.id, &wizard)?;
    Ok(Json(WizardView::from(&wizard)))
}

pub async fn get_wizard(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<WizardView>> {
    let conn = state.db.get()?;
    let wizard = load(&conn, &state.catalog, &ctx.user.id)?;
    Ok(Json(WizardView::from(&wizard)))
}

/// Drop the draft. A paid placeholder listing stays and can be resumed
/// with `start`.
pub async fn discard_wizard(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    if !queries::clear_resume_token(&conn, &ctx.user.id)? {
        return Err(AppError::NotFound(msg::WIZARD_NOT_FOUND.into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_wizard_form(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(patch): Json<FormPatch>,
) -> Result<Json<WizardView>> {
    let conn = state.db.get()?;
    let mut wizard = load_open(&conn, &state.catalog, &ctx.user.id)?;
    wizard.update_form(patch);
    save(&conn, &ctx.user.id, &wizard)?;
    Ok(Json(WizardView::from(&wizard)))
}

pub async fn wizard_next(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<WizardView>> {
    let conn = state.db.get()?;
    let mut wizard = load_open(&conn, &state.catalog, &ctx.user.id)?;
    wizard.next()?;
    save(&conn, &ctx.user.id, &wizard)?;
    Ok(Json(WizardView::from(&wizard)))
}

pub async fn wizard_previous(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<WizardView>> {
    let conn = state.db.get()?;
    let mut wizard = load_open(&conn, &state.catalog, &ctx.user.id)?;
    wizard.previous();
    save(&conn, &ctx.user.id, &wizard)?;
    Ok(Json(WizardView::from(&wizard)))
}

/// Write the listing and activate the business.
pub async fn submit_wizard(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<WizardView>> {
    let conn = state.db.get()?;
    let mut wizard = load(&conn, &state.catalog, &ctx.user.id)?;

    match wizard.submit(&conn, &ctx.user.id) {
        Ok(business) => {
            save(&conn, &ctx.user.id, &wizard)?;
            let mut view = WizardView::from(&wizard);
            view.business = Some(business);
            Ok(Json(view))
        }
        Err(e) => {
            if let Some(message) = wizard.error() {
                tracing::info!("Listing submission for user {} refused: {}", ctx.user.id, message);
            }
            Err(AppError::from(e))
        }
    }
}
