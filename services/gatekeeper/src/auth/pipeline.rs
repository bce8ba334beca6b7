//! Authentication pipeline middleware.
//!
//! # Purpose
//! Turns an inbound request into a [`RequestContext`]: assigns a request id,
//! honours skip paths, extracts the client certificate, and resolves the
//! user, role and tenant behind it.
//!
//! # Key invariants
//! - The request id is assigned before any check and echoed in
//!   `x-request-id` on every response, rejections included.
//! - Unknown subjects get 403, not 401, so probers learn nothing about
//!   certificate validity. All 401/403 bodies are identical whatever the
//!   internal reason; the reason goes to the audit trail.
//! - Every synchronous storage call is bounded by `storage_timeout`; a
//!   timeout is a 500 like any other backend failure.
//! - Dropping the request future cancels in-flight storage calls. The
//!   last-login refresh runs on its own task and is unaffected.
use crate::api::error::{
    ApiError, MSG_ACCESS_DENIED, MSG_CERTIFICATE_REQUIRED, api_forbidden, api_internal,
    api_unauthorized,
};
use crate::audit::{self, AuditTrail};
use crate::auth::context::RequestContext;
use crate::auth::extract::{client_ip, extract_certificate, user_agent};
use crate::auth::last_login::LastLoginUpdater;
use crate::config::AuthConfig;
use crate::model::AuditEvent;
use crate::observability::Observer;
use crate::store::{IdentityStore, StoreError, StoreResult};
use axum::extract::{Request, State};
use axum::http::{Extensions, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gatekeeper_authz::{AuthenticatedUser, AuthzResult, SkipPathMatcher};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AuthPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    config: AuthConfig,
    skip: SkipPathMatcher,
    store: Arc<dyn IdentityStore>,
    audit: AuditTrail,
    observer: Arc<dyn Observer>,
    last_login: LastLoginUpdater,
}

impl AuthPipeline {
    /// # Errors
    /// - `AuthzError::InvalidPathPattern` when a skip path is empty.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn IdentityStore>,
        audit: AuditTrail,
        observer: Arc<dyn Observer>,
    ) -> AuthzResult<Self> {
        let skip = SkipPathMatcher::new(&config.skip_paths)?;
        let last_login =
            LastLoginUpdater::new(store.clone(), observer.clone(), config.last_login_timeout);
        Ok(Self {
            inner: Arc::new(PipelineInner {
                config,
                skip,
                store,
                audit,
                observer,
                last_login,
            }),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Run the checks for one request, filling in `ctx` on success.
    pub async fn evaluate(
        &self,
        ctx: &mut RequestContext,
        extensions: &Extensions,
        headers: &HeaderMap,
        path: &str,
    ) -> Result<(), ApiError> {
        let inner = &self.inner;
        if inner.skip.matches(path) {
            self.decision("allow", "skip_path");
            return Ok(());
        }
        if !inner.config.enabled {
            self.decision("allow", "auth_disabled");
            return Ok(());
        }

        let Some((certificate, source)) =
            extract_certificate(extensions, headers, inner.config.trust_proxy_headers)
        else {
            if inner.config.require_mtls {
                self.decision("reject", "no_certificate");
                return Err(api_unauthorized(MSG_CERTIFICATE_REQUIRED));
            }
            self.decision("allow", "unauthenticated");
            return Ok(());
        };
        let subject = certificate.normalized_subject();
        tracing::debug!(source = source.as_str(), %subject, "client certificate presented");

        let user = match self.storage(inner.store.get_user_by_subject(&subject)).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                let event = audit::auth_failure(ctx, Some(&subject), "unknown_subject", path);
                return Err(self.deny(event, "unknown_subject").await);
            }
            Err(err) => return Err(self.fail("resolve user", &err)),
        };
        let identified = |reason: &str| {
            audit::auth_failure(ctx, Some(&subject), reason, path)
                .tenant(user.tenant_id.clone())
                .user(user.id.clone())
        };
        if !user.is_active {
            let event = identified("user_inactive");
            return Err(self.deny(event, "user_inactive").await);
        }

        let role = match self.storage(inner.store.get_role(&user.role_id)).await {
            Ok(role) => Some(role),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(user_id = %user.id, role_id = %user.role_id, "user references missing role");
                None
            }
            Err(err) => return Err(self.fail("resolve role", &err)),
        };

        let tenant = match self.storage(inner.store.get_tenant(&user.tenant_id)).await {
            Ok(tenant) => tenant,
            Err(StoreError::NotFound(_)) => {
                let event = identified("tenant_not_found");
                return Err(self.deny(event, "tenant_not_found").await);
            }
            Err(err) => return Err(self.fail("resolve tenant", &err)),
        };
        if !tenant.is_active() {
            let event = identified("tenant_inactive").detail("tenant_status", tenant.status.as_str());
            return Err(self.deny(event, "tenant_inactive").await);
        }

        let user_id = user.id.clone();
        ctx.user = Some(AuthenticatedUser::new(
            user.id,
            user.tenant_id,
            subject,
            user.common_name,
            role,
        ));
        ctx.tenant = Some(tenant);
        inner.last_login.schedule(user_id);
        self.decision("allow", "authenticated");
        Ok(())
    }

    async fn storage<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let timeout = self.inner.config.storage_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .unwrap_or_else(|_| Err(StoreError::Unavailable(format!("storage call exceeded {timeout:?}"))))
    }

    async fn deny(&self, event: AuditEvent, reason: &'static str) -> ApiError {
        tracing::info!(reason, subject = ?event.subject, "authentication rejected");
        self.inner.audit.record(event).await;
        self.decision("reject", reason);
        api_forbidden(MSG_ACCESS_DENIED)
    }

    fn fail(&self, context: &str, err: &StoreError) -> ApiError {
        self.decision("error", "storage_error");
        api_internal(context, err)
    }

    fn decision(&self, outcome: &'static str, reason: &'static str) {
        self.inner.observer.auth_decision(outcome, reason);
    }
}

/// Axum middleware entry point; install with
/// `axum::middleware::from_fn_with_state(pipeline, authenticate)`.
pub async fn authenticate(
    State(pipeline): State<AuthPipeline>,
    mut request: Request,
    next: Next,
) -> Response {
    let trust_proxy_headers = pipeline.config().trust_proxy_headers;
    let mut ctx = RequestContext::new(
        client_ip(request.extensions(), request.headers(), trust_proxy_headers),
        user_agent(request.headers()),
    );
    let request_id = ctx.request_id;
    let path = request.uri().path().to_string();
    let span = tracing::debug_span!("authenticate", %request_id, %path);

    let result = pipeline
        .evaluate(&mut ctx, request.extensions(), request.headers(), &path)
        .instrument(span)
        .await;
    let mut response = match result {
        Ok(()) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => err.with_request_id(request_id).into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
