use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::User;
use crate::util::extract_bearer_token;

/// The authenticated caller, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user: User,
}

/// Resolve `Authorization: Bearer <api key>` to a user.
pub async fn user_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let api_key = extract_bearer_token(request.headers())
        .ok_or(AppError::Unauthorized)?
        .to_string();

    let user = {
        let conn = state.db.get()?;
        queries::get_user_by_api_key(&conn, &api_key)?.ok_or(AppError::Unauthorized)?
    };

    request.extensions_mut().insert(UserContext { user });

    Ok(next.run(request).await)
}
