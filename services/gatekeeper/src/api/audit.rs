//! Audit query handlers.
//!
//! Results are newest first and limited to the retention window. Tenant
//! members only ever see their own tenant's events.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{AuditListResponse, AuditQuery};
use crate::api::{AUDIT_READ, store_failure};
use crate::app::AppState;
use crate::auth::RequestContext;
use crate::store::ListOptions;
use axum::Json;
use axum::extract::{Path, Query, State};

fn options(query: &AuditQuery) -> ListOptions {
    ListOptions::new(query.limit, query.offset.unwrap_or(0))
}

pub(crate) async fn list_tenant_events(
    Path(tenant_id): Path<String>,
    Query(query): Query<AuditQuery>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<AuditListResponse>, ApiError> {
    state.guard.require_permission(&ctx, &AUDIT_READ).await?;
    match state.store.list_events_by_tenant(&tenant_id, options(&query)).await {
        Ok(events) => Ok(Json(AuditListResponse { events })),
        Err(err) => Err(store_failure(&state, &ctx, "failed to list audit events", err).await),
    }
}

/// Platform-wide audit listing, optionally filtered by `type` or `user_id`.
///
/// # Errors
/// - 400 when both filters are given.
pub(crate) async fn list_events(
    Query(query): Query<AuditQuery>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<AuditListResponse>, ApiError> {
    let options = options(&query);
    let result = match (query.event_type, query.user_id.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(
                api_validation_error("filter by type or user_id, not both")
                    .with_request_id(ctx.request_id),
            );
        }
        (Some(event_type), None) => state.store.list_events_by_type(event_type, options).await,
        (None, Some(user_id)) => state.store.list_events_by_user(user_id, options).await,
        (None, None) => state.store.list_events(options).await,
    };
    match result {
        Ok(events) => Ok(Json(AuditListResponse { events })),
        Err(err) => Err(store_failure(&state, &ctx, "failed to list audit events", err).await),
    }
}
