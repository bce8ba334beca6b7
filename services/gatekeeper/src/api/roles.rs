//! Role API handlers.
//!
//! Tenants see the global predefined roles alongside their own custom roles
//! but can only create and delete the latter. A caller cannot grant a custom
//! role any permission they do not hold themselves.
use crate::api::error::{ApiError, api_not_found, api_validation_error};
use crate::api::types::{CreateRoleRequest, ListResponse};
use crate::api::{ROLES_CREATE, ROLES_DELETE, ROLES_READ, store_failure};
use crate::app::AppState;
use crate::audit::admin_change;
use crate::auth::RequestContext;
use crate::model::{AuditEventType, Permission, Role};
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use uuid::Uuid;

pub(crate) async fn list_roles(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ListResponse<Role>>, ApiError> {
    state.guard.require_permission(&ctx, &ROLES_READ).await?;
    match state.store.list_roles_by_tenant(&tenant_id).await {
        Ok(items) => Ok(Json(ListResponse { items })),
        Err(err) => Err(store_failure(&state, &ctx, "failed to list roles", err).await),
    }
}

pub(crate) async fn create_role(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.guard.require_permission(&ctx, &ROLES_CREATE).await?;
    let permissions = body
        .permissions
        .iter()
        .map(|value| Permission::parse(value))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| api_validation_error(&err.to_string()).with_request_id(ctx.request_id))?;
    for permission in &permissions {
        state.guard.require_permission(&ctx, permission).await?;
    }

    let role = Role::custom(
        Uuid::new_v4().to_string(),
        tenant_id,
        body.name,
        permissions,
        body.description,
        Utc::now(),
    )
    .map_err(|err| api_validation_error(&err.to_string()).with_request_id(ctx.request_id))?;
    let role = match state.store.create_role(role).await {
        Ok(role) => role,
        Err(err) => return Err(store_failure(&state, &ctx, "failed to create role", err).await),
    };
    let tenant_id = role.tenant_id.clone().unwrap_or_default();
    let event = admin_change(&ctx, AuditEventType::RoleCreated, &tenant_id, "role", &role.id)
        .detail("name", role.name.clone());
    state.audit.record(event).await;
    Ok((StatusCode::CREATED, Json(role)))
}

/// Delete a custom role of the tenant. Global roles are never deletable here.
pub(crate) async fn delete_role(
    Path((tenant_id, role_id)): Path<(String, String)>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<StatusCode, ApiError> {
    state.guard.require_permission(&ctx, &ROLES_DELETE).await?;
    match state.store.get_role(&role_id).await {
        Ok(role) if role.tenant_id.as_deref() == Some(tenant_id.as_str()) => {}
        Ok(_) | Err(StoreError::NotFound(_)) => {
            return Err(api_not_found("role not found").with_request_id(ctx.request_id));
        }
        Err(err) => return Err(store_failure(&state, &ctx, "failed to load role", err).await),
    }
    if let Err(err) = state.store.delete_role(&role_id).await {
        return Err(store_failure(&state, &ctx, "failed to delete role", err).await);
    }
    let event = admin_change(&ctx, AuditEventType::RoleDeleted, &tenant_id, "role", &role_id);
    state.audit.record(event).await;
    Ok(StatusCode::NO_CONTENT)
}
