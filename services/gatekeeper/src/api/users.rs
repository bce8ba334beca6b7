//! Tenant user API handlers.
//!
//! # Purpose
//! Registers certificate identities as tenant users. The subject DN in the
//! request is normalized the same way the pipeline normalizes presented
//! certificates, so the stored subject matches at login.
//!
//! # Security considerations
//! - Assigning a platform-typed role requires platform admin.
//! - A user's subject is fixed at creation; re-keying means delete and create.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{CreateUserRequest, ListResponse};
use crate::api::{
    USERS_CREATE, USERS_DELETE, USERS_READ, USERS_UPDATE, assignable_role, store_failure,
    tenant_user,
};
use crate::app::AppState;
use crate::audit::admin_change;
use crate::auth::RequestContext;
use crate::model::{AuditEventType, TenantUser, UserUpdate};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use gatekeeper_identity::parse_dn;
use uuid::Uuid;

pub(crate) async fn list_users(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ListResponse<TenantUser>>, ApiError> {
    state.guard.require_permission(&ctx, &USERS_READ).await?;
    match state.store.list_users_by_tenant(&tenant_id).await {
        Ok(items) => Ok(Json(ListResponse { items })),
        Err(err) => Err(store_failure(&state, &ctx, "failed to list users", err).await),
    }
}

/// Register a certificate subject as a user of the tenant.
///
/// # Errors
/// - 400 for an unparseable DN or a role outside the tenant.
/// - 409 when the id or subject is already registered.
/// - 429 when the tenant `users` quota is exhausted.
pub(crate) async fn create_user(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.guard.require_permission(&ctx, &USERS_CREATE).await?;
    let certificate = parse_dn(&body.subject_dn).map_err(|err| {
        api_validation_error(&format!("subject_dn: {err}")).with_request_id(ctx.request_id)
    })?;
    let role = assignable_role(&state, &ctx, &tenant_id, &body.role_id).await?;

    let now = Utc::now();
    let user = TenantUser {
        id: body.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        tenant_id,
        subject: certificate.normalized_subject(),
        common_name: certificate.common_name,
        email: body.email.or(certificate.email),
        role_id: role.id,
        is_active: true,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    };
    let user = match state.store.create_user(user).await {
        Ok(user) => user,
        Err(err) => return Err(store_failure(&state, &ctx, "failed to create user", err).await),
    };
    let event = admin_change(&ctx, AuditEventType::UserCreated, &user.tenant_id, "user", &user.id)
        .detail("role_id", user.role_id.clone());
    state.audit.record(event).await;
    Ok((StatusCode::CREATED, Json(user)))
}

pub(crate) async fn get_user(
    Path((tenant_id, user_id)): Path<(String, String)>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<TenantUser>, ApiError> {
    state.guard.require_permission(&ctx, &USERS_READ).await?;
    tenant_user(&state, &ctx, &tenant_id, &user_id).await.map(Json)
}

pub(crate) async fn update_user(
    Path((tenant_id, user_id)): Path<(String, String)>,
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(update): Json<UserUpdate>,
) -> Result<Json<TenantUser>, ApiError> {
    state.guard.require_permission(&ctx, &USERS_UPDATE).await?;
    tenant_user(&state, &ctx, &tenant_id, &user_id).await?;
    if let Some(role_id) = &update.role_id {
        assignable_role(&state, &ctx, &tenant_id, role_id).await?;
    }
    let user = match state.store.update_user(&user_id, update).await {
        Ok(user) => user,
        Err(err) => return Err(store_failure(&state, &ctx, "failed to update user", err).await),
    };
    let event = admin_change(&ctx, AuditEventType::UserUpdated, &tenant_id, "user", &user_id)
        .detail("is_active", user.is_active.to_string());
    state.audit.record(event).await;
    Ok(Json(user))
}

pub(crate) async fn delete_user(
    Path((tenant_id, user_id)): Path<(String, String)>,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<StatusCode, ApiError> {
    state.guard.require_permission(&ctx, &USERS_DELETE).await?;
    tenant_user(&state, &ctx, &tenant_id, &user_id).await?;
    if let Err(err) = state.store.delete_user(&user_id).await {
        return Err(store_failure(&state, &ctx, "failed to delete user", err).await);
    }
    let event = admin_change(&ctx, AuditEventType::UserDeleted, &tenant_id, "user", &user_id);
    state.audit.record(event).await;
    Ok(StatusCode::NO_CONTENT)
}
