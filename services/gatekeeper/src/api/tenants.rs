//! Tenant API handlers.
//!
//! # Purpose
//! Tenant CRUD for platform admins, tenant reads for members, and the usage
//! counters that enforce quotas for resources provisioned elsewhere.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{CreateTenantRequest, ListResponse};
use crate::api::{TENANTS_READ, TENANTS_UPDATE, parse_class, store_failure};
use crate::app::AppState;
use crate::audit::admin_change;
use crate::auth::RequestContext;
use crate::model::{AuditEventType, Tenant, TenantUpdate, TenantUsage};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;

pub(crate) async fn list_tenants(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ListResponse<Tenant>>, ApiError> {
    let items = match state.store.list_tenants().await {
        Ok(items) => items,
        Err(err) => return Err(store_failure(&state, &ctx, "failed to list tenants", err).await),
    };
    Ok(Json(ListResponse { items }))
}

pub(crate) async fn create_tenant(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<CreateTenantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.name.trim().is_empty() {
        return Err(api_validation_error("tenant name is required").with_request_id(ctx.request_id));
    }
    let mut tenant = Tenant::new(body.id, body.name, Utc::now());
    if let Some(quota) = body.quota {
        tenant.quota = quota;
    }
    tenant.metadata = body.metadata;

    let tenant = match state.store.create_tenant(tenant).await {
        Ok(tenant) => tenant,
        Err(err) => return Err(store_failure(&state, &ctx, "failed to create tenant", err).await),
    };
    let event = admin_change(&ctx, AuditEventType::TenantCreated, &tenant.id, "tenant", &tenant.id);
    state.audit.record(event).await;
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub(crate) async fn get_tenant(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Tenant>, ApiError> {
    state.guard.require_permission(&ctx, &TENANTS_READ).await?;
    match state.store.get_tenant(&tenant_id).await {
        Ok(tenant) => Ok(Json(tenant)),
        Err(err) => Err(store_failure(&state, &ctx, "failed to load tenant", err).await),
    }
}

/// Rename, suspend, re-quota or re-tag a tenant.
///
/// # Errors
/// - 403 unless the caller is a platform admin.
/// - 404 when the tenant does not exist.
pub(crate) async fn update_tenant(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(update): Json<TenantUpdate>,
) -> Result<Json<Tenant>, ApiError> {
    state.guard.require_platform_admin(&ctx).await?;
    let status = update.status;
    let tenant = match state.store.update_tenant(&tenant_id, update).await {
        Ok(tenant) => tenant,
        Err(err) => return Err(store_failure(&state, &ctx, "failed to update tenant", err).await),
    };
    let mut event = admin_change(&ctx, AuditEventType::TenantUpdated, &tenant.id, "tenant", &tenant.id);
    if let Some(status) = status {
        event = event.detail("status", status.as_str());
    }
    state.audit.record(event).await;
    Ok(Json(tenant))
}

/// Delete an empty tenant.
///
/// # Errors
/// - 409 while the tenant still has users.
pub(crate) async fn delete_tenant(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<StatusCode, ApiError> {
    state.guard.require_platform_admin(&ctx).await?;
    if let Err(err) = state.store.delete_tenant(&tenant_id).await {
        return Err(store_failure(&state, &ctx, "failed to delete tenant", err).await);
    }
    let event = admin_change(&ctx, AuditEventType::TenantDeleted, &tenant_id, "tenant", &tenant_id);
    state.audit.record(event).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Consume one unit of `class`; 429 once the quota is reached.
pub(crate) async fn increment_usage(
    Path((tenant_id, class)): Path<(String, String)>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<TenantUsage>, ApiError> {
    state.guard.require_permission(&ctx, &TENANTS_UPDATE).await?;
    let class = parse_class(&ctx, &class)?;
    match state.store.increment_usage(&tenant_id, class).await {
        Ok(usage) => Ok(Json(usage)),
        Err(err) => Err(store_failure(&state, &ctx, "failed to increment usage", err).await),
    }
}

pub(crate) async fn decrement_usage(
    Path((tenant_id, class)): Path<(String, String)>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<TenantUsage>, ApiError> {
    state.guard.require_permission(&ctx, &TENANTS_UPDATE).await?;
    let class = parse_class(&ctx, &class)?;
    match state.store.decrement_usage(&tenant_id, class).await {
        Ok(usage) => Ok(Json(usage)),
        Err(err) => Err(store_failure(&state, &ctx, "failed to decrement usage", err).await),
    }
}
