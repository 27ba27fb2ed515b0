use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::payments::Provider;

#[derive(Debug, Serialize)]
pub struct ProviderResponse {
    pub provider: Provider,
}

#[derive(Debug, Deserialize)]
pub struct SetProviderRequest {
    pub provider: String,
}

pub async fn get_provider(State(state): State<AppState>) -> Json<ProviderResponse> {
    Json(ProviderResponse {
        provider: state.providers.get(),
    })
}

/// Switch the provider used for new checkouts. Whether it is configured is
/// only checked when a session is created.
pub async fn set_provider(
    State(state): State<AppState>,
    Json(request): Json<SetProviderRequest>,
) -> Result<Json<ProviderResponse>> {
    let provider: Provider = request.provider.parse()?;
    state.providers.switch(provider)?;
    Ok(Json(ProviderResponse { provider }))
}
