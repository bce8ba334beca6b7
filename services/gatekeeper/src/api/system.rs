//! Health and caller-identity endpoints.
//!
//! # Security considerations
//! `/healthz` is normally a skip path and reveals only the backend name.
//! `/v1/whoami` echoes the caller's own identity and nothing else.
use crate::api::error::{ApiError, api_internal};
use crate::api::types::{HealthResponse, WhoAmIResponse};
use crate::app::AppState;
use crate::auth::{CurrentUser, RequestContext};
use axum::Json;
use axum::extract::State;

/// Probe the identity store.
///
/// # Errors
/// - Returns 500 if the storage health check fails.
pub(crate) async fn healthz(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    if let Err(err) = state.store.health_check().await {
        return Err(api_internal("storage unavailable", &err));
    }
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.store.backend_name().to_string(),
        durable: state.store.is_durable(),
    }))
}

/// Return the authenticated caller and their tenant.
///
/// # Errors
/// - 401 when the request carries no authenticated user.
pub(crate) async fn whoami(ctx: RequestContext, CurrentUser(user): CurrentUser) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        request_id: ctx.request_id.to_string(),
        user,
        tenant: ctx.tenant,
    })
}
