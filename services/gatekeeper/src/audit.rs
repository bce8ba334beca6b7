//! Audit trail.
//!
//! # Purpose
//! Records security-relevant events through the identity store. Writes are
//! awaited so the event is persisted before the triggering request returns,
//! but a failed write never changes the outcome of that request.
//!
//! # Key invariants
//! - Failures are logged and counted, never retried, never shown to clients.
//! - Denial reasons go into `details`; responses stay generic.
use crate::auth::RequestContext;
use crate::model::{AuditEvent, AuditEventType};
use crate::observability::Observer;
use crate::store::IdentityStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn IdentityStore>,
    observer: Arc<dyn Observer>,
    timeout: Duration,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn IdentityStore>, observer: Arc<dyn Observer>, timeout: Duration) -> Self {
        Self {
            store,
            observer,
            timeout,
        }
    }

    pub async fn record(&self, event: AuditEvent) {
        let event_type = event.event_type;
        let event_id = event.id.clone();
        match tokio::time::timeout(self.timeout, self.store.log_event(event)).await {
            Ok(Ok(())) => {
                tracing::debug!(%event_type, %event_id, "audit event recorded");
            }
            Ok(Err(err)) => {
                tracing::warn!(%event_type, %event_id, error = %err, "audit write failed");
                self.observer.audit_write_failed();
            }
            Err(_) => {
                tracing::warn!(%event_type, %event_id, "audit write timed out");
                self.observer.audit_write_failed();
            }
        }
    }
}

/// Failed authentication attempt. `subject` is the normalized certificate
/// subject when one was presented.
pub fn auth_failure(ctx: &RequestContext, subject: Option<&str>, reason: &str, path: &str) -> AuditEvent {
    let mut event = AuditEvent::new(AuditEventType::AuthFailure, "authenticate")
        .detail("reason", reason)
        .detail("path", path)
        .client(ctx.client_ip.clone(), ctx.user_agent.clone());
    if let Some(subject) = subject {
        event = event.subject(subject);
    }
    event.detail("request_id", ctx.request_id.to_string())
}

/// Authorization denial for an authenticated caller.
pub fn access_denied(ctx: &RequestContext, action: &str, reason: &str) -> AuditEvent {
    let mut event = AuditEvent::new(AuditEventType::AccessDenied, action)
        .detail("reason", reason)
        .detail("request_id", ctx.request_id.to_string())
        .client(ctx.client_ip.clone(), ctx.user_agent.clone());
    if let Some(user) = &ctx.user {
        event = event
            .tenant(user.tenant_id.clone())
            .user(user.user_id.clone())
            .subject(user.subject.clone());
    }
    event
}

/// Successful administrative change made by the caller in `ctx`.
pub fn admin_change(
    ctx: &RequestContext,
    event_type: AuditEventType,
    tenant_id: &str,
    resource_type: &str,
    resource_id: &str,
) -> AuditEvent {
    let mut event = AuditEvent::new(event_type, event_type.as_str())
        .tenant(tenant_id)
        .resource(resource_type, resource_id)
        .detail("request_id", ctx.request_id.to_string())
        .client(ctx.client_ip.clone(), ctx.user_agent.clone());
    if let Some(user) = &ctx.user {
        event = event
            .user(user.user_id.clone())
            .subject(user.subject.clone());
    }
    event
}
