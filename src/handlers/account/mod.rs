mod discounts;
mod payments;
mod provider;
mod subscriptions;
mod wizard;

pub use discounts::*;
pub use payments::*;
pub use provider::*;
pub use subscriptions::*;
pub use wizard::*;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use crate::db::AppState;
use crate::middleware::user_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/provider", get(get_provider).put(set_provider))
        .route("/discounts/apply", post(apply_discount_code))
        .route("/checkout", post(create_checkout))
        .route("/charge", post(charge_card))
        .route("/upgrade", post(upgrade_listing))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/{id}/cancel", post(cancel_subscription))
        .route("/businesses", get(list_businesses))
        .route("/wizard", get(get_wizard).delete(discard_wizard))
        .route("/wizard/start", post(start_wizard))
        .route("/wizard/form", patch(update_wizard_form))
        .route("/wizard/next", post(wizard_next))
        .route("/wizard/previous", post(wizard_previous))
        .route("/wizard/submit", post(submit_wizard))
        .layer(middleware::from_fn_with_state(state, user_auth))
}
