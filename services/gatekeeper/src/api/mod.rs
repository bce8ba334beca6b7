//! Gatekeeper admin HTTP API.
//!
//! # Purpose
//! Handler modules for tenant, user, role and audit administration, plus the
//! permission names the handlers check and shared lookup helpers.
//!
//! # Key invariants
//! - Records are looked up through the tenant in the path. A user or role
//!   that exists but belongs to another tenant is reported as 404.
//! - Only platform admins may hand out a platform-typed role.
//! - Nobody can assign a role granting a permission they lack.
pub mod audit;
pub mod error;
pub mod roles;
pub mod system;
pub mod tenants;
pub mod types;
pub mod users;

use crate::api::error::{ApiError, api_not_found, api_quota_exceeded, api_store_error};
use crate::app::AppState;
use crate::audit as trail;
use crate::auth::RequestContext;
use crate::model::{AuditEventType, ResourceClass, Role, RoleType, TenantUser};
use crate::store::StoreError;
use gatekeeper_authz::Permission;

pub const TENANTS_READ: Permission = Permission::from_static("tenants:read");
pub const TENANTS_UPDATE: Permission = Permission::from_static("tenants:update");
pub const USERS_READ: Permission = Permission::from_static("users:read");
pub const USERS_CREATE: Permission = Permission::from_static("users:create");
pub const USERS_UPDATE: Permission = Permission::from_static("users:update");
pub const USERS_DELETE: Permission = Permission::from_static("users:delete");
pub const ROLES_READ: Permission = Permission::from_static("roles:read");
pub const ROLES_CREATE: Permission = Permission::from_static("roles:create");
pub const ROLES_DELETE: Permission = Permission::from_static("roles:delete");
pub const AUDIT_READ: Permission = Permission::from_static("audit:read");

/// Map a store failure, auditing quota rejections on the way out.
pub(crate) async fn store_failure(
    state: &AppState,
    ctx: &RequestContext,
    context: &str,
    err: StoreError,
) -> ApiError {
    if let StoreError::QuotaExceeded { tenant_id, class } = &err {
        let event = trail::admin_change(
            ctx,
            AuditEventType::QuotaExceeded,
            tenant_id,
            "quota",
            class.as_str(),
        );
        state.audit.record(event).await;
        return api_quota_exceeded(&err.to_string()).with_request_id(ctx.request_id);
    }
    api_store_error(context, err).with_request_id(ctx.request_id)
}

pub(crate) async fn tenant_user(
    state: &AppState,
    ctx: &RequestContext,
    tenant_id: &str,
    user_id: &str,
) -> Result<TenantUser, ApiError> {
    match state.store.get_user(user_id).await {
        Ok(user) if user.tenant_id == tenant_id => Ok(user),
        Ok(_) | Err(StoreError::NotFound(_)) => {
            Err(api_not_found("user not found").with_request_id(ctx.request_id))
        }
        Err(err) => Err(store_failure(state, ctx, "failed to load user", err).await),
    }
}

/// Resolve a role a user in `tenant_id` may be assigned.
///
/// The caller must already hold every permission the role grants, the same
/// rule custom role creation applies.
pub(crate) async fn assignable_role(
    state: &AppState,
    ctx: &RequestContext,
    tenant_id: &str,
    role_id: &str,
) -> Result<Role, ApiError> {
    let role = match state.store.get_role(role_id).await {
        Ok(role) if role.is_global() || role.tenant_id.as_deref() == Some(tenant_id) => role,
        Ok(_) | Err(StoreError::NotFound(_)) => {
            return Err(
                error::api_validation_error("role does not exist in this tenant")
                    .with_request_id(ctx.request_id),
            );
        }
        Err(err) => return Err(store_failure(state, ctx, "failed to load role", err).await),
    };
    if role.role_type == RoleType::Platform {
        state.guard.require_platform_admin(ctx).await?;
    }
    for permission in &role.permissions {
        state.guard.require_permission(ctx, permission).await?;
    }
    Ok(role)
}

pub(crate) fn parse_class(ctx: &RequestContext, value: &str) -> Result<ResourceClass, ApiError> {
    value.parse().map_err(|err: crate::model::UnknownResourceClass| {
        error::api_validation_error(&err.to_string()).with_request_id(ctx.request_id)
    })
}
