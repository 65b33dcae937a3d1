//! Advertising API endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use gattsim_core::AdvertisingSnapshot;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the advertising router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_advertising))
}

/// Get the advertising state.
#[utoipa::path(
    get,
    path = "/api/advertising",
    tag = "advertising",
    operation_id = "getAdvertising",
    summary = "Get advertising payloads",
    description = "Returns the advertising data and scan response as hex, the \
        device identifier carried in manufacturer data, and any service-data \
        records dropped to fit the legacy size limit.",
    responses(
        (status = 200, description = "Advertising state retrieved", body = AdvertisingSnapshot),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_advertising(
    State(state): State<SharedState>,
) -> ApiResult<Json<AdvertisingSnapshot>> {
    Ok(Json(state.peripheral().snapshot().await?.advertising))
}
