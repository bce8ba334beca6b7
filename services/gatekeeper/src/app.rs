//! Gatekeeper HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, installs the authentication pipeline and route
//! guards, and defines the shared state injected into handlers.
//!
//! # Notes
//! Layer order, outermost first: trace span, authentication pipeline, route
//! guards, handler. Handlers make any method-specific permission checks
//! themselves through [`AppState::guard`].
use crate::api;
use crate::audit::AuditTrail;
use crate::auth::{AuthPipeline, Guard, GuardRule, RouteGuard, authenticate, enforce};
use crate::config::AuthConfig;
use crate::observability::{self, Observer};
use crate::store::IdentityStore;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use gatekeeper_authz::AuthzResult;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub audit: AuditTrail,
    pub guard: Guard,
    pub pipeline: AuthPipeline,
}

impl AppState {
    /// # Errors
    /// - Fails when a configured skip path cannot be compiled.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        auth: AuthConfig,
        observer: Arc<dyn Observer>,
    ) -> AuthzResult<Self> {
        let audit = AuditTrail::new(store.clone(), observer.clone(), auth.storage_timeout);
        let guard = Guard::new(audit.clone(), observer.clone());
        let pipeline = AuthPipeline::new(auth, store.clone(), audit.clone(), observer)?;
        Ok(Self {
            store,
            audit,
            guard,
            pipeline,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });
    let platform_only = RouteGuard::new(state.guard.clone(), [GuardRule::PlatformAdmin]);
    let tenant_scoped = RouteGuard::new(state.guard.clone(), [GuardRule::TenantAccess]);

    let platform = Router::new()
        .route(
            "/v1/tenants",
            get(api::tenants::list_tenants).post(api::tenants::create_tenant),
        )
        .route("/v1/audit", get(api::audit::list_events))
        .route_layer(from_fn_with_state(platform_only, enforce));

    let tenant = Router::new()
        .route(
            "/v1/tenants/:tenant_id",
            get(api::tenants::get_tenant)
                .patch(api::tenants::update_tenant)
                .delete(api::tenants::delete_tenant),
        )
        .route(
            "/v1/tenants/:tenant_id/usage/:class",
            post(api::tenants::increment_usage).delete(api::tenants::decrement_usage),
        )
        .route(
            "/v1/tenants/:tenant_id/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/v1/tenants/:tenant_id/users/:user_id",
            get(api::users::get_user)
                .patch(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route(
            "/v1/tenants/:tenant_id/roles",
            get(api::roles::list_roles).post(api::roles::create_role),
        )
        .route(
            "/v1/tenants/:tenant_id/roles/:role_id",
            axum::routing::delete(api::roles::delete_role),
        )
        .route(
            "/v1/tenants/:tenant_id/audit",
            get(api::audit::list_tenant_events),
        )
        .route_layer(from_fn_with_state(tenant_scoped, enforce));

    let pipeline = state.pipeline.clone();
    Router::new()
        .route("/healthz", get(api::system::healthz))
        .route("/v1/whoami", get(api::system::whoami))
        .merge(platform)
        .merge(tenant)
        .layer(from_fn_with_state(pipeline, authenticate))
        .layer(trace_layer)
        .with_state(state)
}
