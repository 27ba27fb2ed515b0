use axum::extract::{Extension, Path, State};

use crate::activation;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::id::is_valid_prefixed_id;
use crate::extractors::Json;
use crate::middleware::UserContext;
use crate::models::{Business, Subscription};

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Vec<Subscription>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_subscriptions_for_user(&conn, &ctx.user.id)?))
}

pub async fn list_businesses(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Vec<Business>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_businesses_for_owner(&conn, &ctx.user.id)?))
}

/// Cancel a subscription and deactivate its listing.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<Subscription>> {
    if !is_valid_prefixed_id(&id) {
        return Err(AppError::NotFound(msg::SUBSCRIPTION_NOT_FOUND.into()));
    }
    let conn = state.db.get()?;
    Ok(Json(activation::cancel_subscription(&conn, &ctx.user.id, &id)?))
}
