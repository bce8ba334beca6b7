//! Authorization guards.
//!
//! # Purpose
//! Checks the caller in a [`RequestContext`] against a permission, a set of
//! permissions, platform-admin status, or a target tenant.
//!
//! # How it fits
//! Guards are used two ways:
//! - directly from handlers (`guard.require_permission(&ctx, &perm).await?`)
//!   when the check depends on the HTTP method or request body;
//! - as a route layer through [`RouteGuard`] and [`enforce`], where
//!   `TenantAccess` reads the target from the `tenant_id` path parameter.
//!
//! # Key invariants
//! - No user in the context is always 401.
//! - Every denial is recorded as an `access_denied` audit event before the
//!   403 is returned. The response body never names the missing permission.
//!
//! # Common pitfalls
//! - Installing [`enforce`] with `.layer` instead of `.route_layer`: path
//!   parameters only exist after routing.
use crate::api::error::{
    ApiError, MSG_ACCESS_DENIED, MSG_AUTHENTICATION_REQUIRED, api_forbidden, api_unauthorized,
    api_unavailable,
};
use crate::audit::{self, AuditTrail};
use crate::auth::context::RequestContext;
use crate::observability::Observer;
use axum::extract::{RawPathParams, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gatekeeper_authz::{AuthenticatedUser, Permission};
use std::sync::Arc;

pub const TENANT_PATH_PARAM: &str = "tenant_id";

#[derive(Clone)]
pub struct Guard {
    audit: AuditTrail,
    observer: Arc<dyn Observer>,
}

impl Guard {
    pub fn new(audit: AuditTrail, observer: Arc<dyn Observer>) -> Self {
        Self { audit, observer }
    }

    pub async fn require_permission<'a>(
        &self,
        ctx: &'a RequestContext,
        permission: &Permission,
    ) -> Result<&'a AuthenticatedUser, ApiError> {
        self.check(
            ctx,
            "permission",
            |user| user.has_permission(permission),
            Denial {
                action: permission.as_str(),
                reason: "missing_permission",
                required: permission.as_str().to_string(),
                target_tenant: None,
            },
        )
        .await
    }

    pub async fn require_any_permission<'a>(
        &self,
        ctx: &'a RequestContext,
        permissions: &[Permission],
    ) -> Result<&'a AuthenticatedUser, ApiError> {
        let required = permissions
            .iter()
            .map(Permission::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.check(
            ctx,
            "any_permission",
            |user| user.has_any_permission(permissions),
            Denial {
                action: "any_permission",
                reason: "missing_permission",
                required,
                target_tenant: None,
            },
        )
        .await
    }

    pub async fn require_platform_admin<'a>(
        &self,
        ctx: &'a RequestContext,
    ) -> Result<&'a AuthenticatedUser, ApiError> {
        self.check(
            ctx,
            "platform_admin",
            |user| user.is_platform_admin,
            Denial {
                action: "platform_admin",
                reason: "not_platform_admin",
                required: "platform-admin".to_string(),
                target_tenant: None,
            },
        )
        .await
    }

    pub async fn require_tenant_access<'a>(
        &self,
        ctx: &'a RequestContext,
        tenant_id: &str,
    ) -> Result<&'a AuthenticatedUser, ApiError> {
        self.check(
            ctx,
            "tenant_access",
            |user| user.can_access_tenant(tenant_id),
            Denial {
                action: "tenant_access",
                reason: "tenant_mismatch",
                required: format!("tenant:{tenant_id}"),
                target_tenant: Some(tenant_id),
            },
        )
        .await
    }

    async fn check<'a>(
        &self,
        ctx: &'a RequestContext,
        guard: &'static str,
        allowed: impl FnOnce(&AuthenticatedUser) -> bool,
        denial: Denial<'_>,
    ) -> Result<&'a AuthenticatedUser, ApiError> {
        let Some(user) = ctx.user() else {
            self.observer.permission_check(guard, false);
            return Err(api_unauthorized(MSG_AUTHENTICATION_REQUIRED).with_request_id(ctx.request_id));
        };
        let granted = allowed(user);
        self.observer.permission_check(guard, granted);
        if granted {
            return Ok(user);
        }

        tracing::info!(
            guard,
            user_id = %user.user_id,
            required = %denial.required,
            "access denied"
        );
        let mut event = audit::access_denied(ctx, denial.action, denial.reason)
            .detail("guard", guard)
            .detail("required", denial.required);
        if let Some(target) = denial.target_tenant {
            event = event.resource("tenant", target);
        }
        self.audit.record(event).await;
        Err(api_forbidden(MSG_ACCESS_DENIED).with_request_id(ctx.request_id))
    }
}

struct Denial<'a> {
    action: &'a str,
    reason: &'static str,
    required: String,
    target_tenant: Option<&'a str>,
}

/// One check applied by [`enforce`].
#[derive(Debug, Clone)]
pub enum GuardRule {
    Permission(Permission),
    AnyPermission(Vec<Permission>),
    PlatformAdmin,
    /// Target tenant comes from the `tenant_id` path parameter.
    TenantAccess,
}

/// Guard plus the rules a route group must satisfy, in order.
#[derive(Clone)]
pub struct RouteGuard {
    guard: Guard,
    rules: Arc<[GuardRule]>,
}

impl RouteGuard {
    pub fn new(guard: Guard, rules: impl IntoIterator<Item = GuardRule>) -> Self {
        Self {
            guard,
            rules: rules.into_iter().collect(),
        }
    }
}

/// Route-layer middleware; install with
/// `axum::middleware::from_fn_with_state(route_guard, enforce)`.
pub async fn enforce(
    State(route): State<RouteGuard>,
    params: Option<RawPathParams>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ctx) = request.extensions().get::<RequestContext>().cloned() else {
        tracing::error!(uri = %request.uri(), "route guard installed without the auth pipeline");
        return api_unavailable().into_response();
    };
    let target_tenant = params.as_ref().and_then(|params| {
        params
            .iter()
            .find(|(name, _)| *name == TENANT_PATH_PARAM)
            .map(|(_, value)| value.to_string())
    });

    for rule in route.rules.iter() {
        let outcome = match rule {
            GuardRule::Permission(permission) => {
                route.guard.require_permission(&ctx, permission).await.map(drop)
            }
            GuardRule::AnyPermission(permissions) => {
                route.guard.require_any_permission(&ctx, permissions).await.map(drop)
            }
            GuardRule::PlatformAdmin => route.guard.require_platform_admin(&ctx).await.map(drop),
            GuardRule::TenantAccess => match target_tenant.as_deref() {
                Some(tenant_id) => route
                    .guard
                    .require_tenant_access(&ctx, tenant_id)
                    .await
                    .map(drop),
                None => {
                    tracing::error!(uri = %request.uri(), "tenant access rule on a route without tenant_id");
                    Err(api_unavailable())
                }
            },
        };
        if let Err(err) = outcome {
            return err.into_response();
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditEventType, Role};
    use crate::observability::{Observation, RecordingObserver};
    use crate::store::memory::InMemoryStore;
    use crate::store::{IdentityStore, ListOptions};
    use axum::http::StatusCode;
    use chrono::Utc;
    use gatekeeper_authz::predefined;
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        observer: Arc<RecordingObserver>,
        guard: Guard,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::default());
        let observer = Arc::new(RecordingObserver::new());
        let audit = AuditTrail::new(store.clone(), observer.clone(), Duration::from_secs(1));
        let guard = Guard::new(audit, observer.clone());
        Fixture {
            store,
            observer,
            guard,
        }
    }

    fn role(name: &str) -> Role {
        predefined::default_roles(Utc::now())
            .into_iter()
            .find(|role| role.name == name)
            .expect("predefined role")
    }

    fn context(tenant_id: &str, role: Option<Role>) -> RequestContext {
        let mut ctx = RequestContext::new(None, None);
        ctx.user = Some(AuthenticatedUser::new(
            "u-1",
            tenant_id,
            "CN=alice",
            "alice",
            role,
        ));
        ctx
    }

    fn perm(value: &'static str) -> Permission {
        Permission::from_static(value)
    }

    async fn denials(store: &InMemoryStore) -> usize {
        store
            .list_events_by_type(AuditEventType::AccessDenied, ListOptions::default())
            .await
            .expect("events")
            .len()
    }

    #[tokio::test]
    async fn missing_user_is_unauthorized() {
        let f = fixture();
        let ctx = RequestContext::new(None, None);
        let err = f
            .guard
            .require_permission(&ctx, &perm("users:read"))
            .await
            .expect_err("anonymous");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(denials(&f.store).await, 0);
    }

    #[tokio::test]
    async fn permission_granted_and_denied() {
        let f = fixture();
        let ctx = context("acme", Some(role(predefined::VIEWER)));
        let user = f
            .guard
            .require_permission(&ctx, &perm("tenants:read"))
            .await
            .expect("viewer reads tenants");
        assert_eq!(user.user_id, "u-1");

        let err = f
            .guard
            .require_permission(&ctx, &perm("users:delete"))
            .await
            .expect_err("viewer cannot delete users");
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.body.message, "access denied");
        assert_eq!(denials(&f.store).await, 1);

        let event = &f
            .store
            .list_events(ListOptions::default())
            .await
            .expect("events")[0];
        assert_eq!(event.details["required"], "users:delete");
        assert_eq!(event.user_id.as_deref(), Some("u-1"));
        assert!(f.observer.observations().contains(&Observation::PermissionCheck {
            guard: "permission",
            allowed: false
        }));
    }

    #[tokio::test]
    async fn user_without_role_has_no_permissions() {
        let f = fixture();
        let ctx = context("acme", None);
        assert!(
            f.guard
                .require_permission(&ctx, &perm("tenants:read"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn any_permission_needs_one_match() {
        let f = fixture();
        let ctx = context("acme", Some(role(predefined::OPERATOR)));
        f.guard
            .require_any_permission(&ctx, &[perm("users:delete"), perm("deployments:create")])
            .await
            .expect("operator creates deployments");
        let err = f
            .guard
            .require_any_permission(&ctx, &[perm("users:delete"), perm("roles:create")])
            .await
            .expect_err("none match");
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn platform_admin_guard() {
        let f = fixture();
        let admin = context("platform", Some(role(predefined::PLATFORM_ADMIN)));
        f.guard
            .require_platform_admin(&admin)
            .await
            .expect("platform admin");

        let tenant_admin = context("acme", Some(role(predefined::TENANT_ADMIN)));
        let err = f
            .guard
            .require_platform_admin(&tenant_admin)
            .await
            .expect_err("tenant admin");
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn tenant_access_is_own_tenant_or_platform_admin() {
        let f = fixture();
        let member = context("acme", Some(role(predefined::VIEWER)));
        f.guard
            .require_tenant_access(&member, "acme")
            .await
            .expect("own tenant");
        let err = f
            .guard
            .require_tenant_access(&member, "globex")
            .await
            .expect_err("other tenant");
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let admin = context("platform", Some(role(predefined::PLATFORM_ADMIN)));
        f.guard
            .require_tenant_access(&admin, "globex")
            .await
            .expect("platform admin crosses tenants");

        let events = f
            .store
            .list_events(ListOptions::default())
            .await
            .expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id.as_deref(), Some("globex"));
    }
}
