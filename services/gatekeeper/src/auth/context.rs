//! Request-scoped authentication context.
//!
//! The pipeline inserts exactly one [`RequestContext`] into the request
//! extensions before any check runs. A context without a user is meaningful:
//! the caller presented no certificate and mTLS is optional, or the path is
//! skipped.
use crate::api::error::{ApiError, MSG_AUTHENTICATION_REQUIRED, api_unauthorized, api_unavailable};
use crate::model::Tenant;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use gatekeeper_authz::AuthenticatedUser;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub user: Option<AuthenticatedUser>,
    pub tenant: Option<Tenant>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Fresh, unauthenticated context with a new request id.
    pub fn new(client_ip: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user: None,
            tenant: None,
            client_ip,
            user_agent,
        }
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        self.user.as_ref()
    }

    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.tenant_id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only reachable without the pipeline layer, which is a wiring bug.
        parts.extensions.get::<RequestContext>().cloned().ok_or_else(|| {
            tracing::error!(uri = %parts.uri, "request context missing");
            api_unavailable()
        })
    }
}

/// Extracts the authenticated caller or rejects with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        let request_id = ctx.request_id;
        ctx.user.map(CurrentUser).ok_or_else(|| {
            api_unauthorized(MSG_AUTHENTICATION_REQUIRED).with_request_id(request_id)
        })
    }
}
