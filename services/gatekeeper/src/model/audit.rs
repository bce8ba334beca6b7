//! Audit events.
//!
//! Events are immutable once written. Reasons for security decisions go into
//! `details`; they are never echoed to clients.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AuthFailure,
    AccessDenied,
    TenantCreated,
    TenantUpdated,
    TenantDeleted,
    UserCreated,
    UserUpdated,
    UserDeleted,
    RoleCreated,
    RoleDeleted,
    QuotaExceeded,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::AuthFailure => "auth_failure",
            AuditEventType::AccessDenied => "access_denied",
            AuditEventType::TenantCreated => "tenant_created",
            AuditEventType::TenantUpdated => "tenant_updated",
            AuditEventType::TenantDeleted => "tenant_deleted",
            AuditEventType::UserCreated => "user_created",
            AuditEventType::UserUpdated => "user_updated",
            AuditEventType::UserDeleted => "user_deleted",
            AuditEventType::RoleCreated => "role_created",
            AuditEventType::RoleDeleted => "role_deleted",
            AuditEventType::QuotaExceeded => "quota_exceeded",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub event_type: AuditEventType,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub subject: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: String,
    pub details: HashMap<String, String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            tenant_id: None,
            user_id: None,
            subject: None,
            resource_type: None,
            resource_id: None,
            action: action.into(),
            details: HashMap::new(),
            client_ip: None,
            user_agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource_type = Some(kind.into());
        self.resource_id = Some(id.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn client(mut self, client_ip: Option<String>, user_agent: Option<String>) -> Self {
        self.client_ip = client_ip;
        self.user_agent = user_agent;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let event = AuditEvent::new(AuditEventType::AccessDenied, "users:delete")
            .tenant("acme")
            .user("u-1")
            .subject("CN=alice")
            .resource("user", "u-2")
            .detail("reason", "missing_permission")
            .client(Some("10.0.0.1".to_string()), None);
        assert_eq!(event.tenant_id.as_deref(), Some("acme"));
        assert_eq!(event.user_id.as_deref(), Some("u-1"));
        assert_eq!(event.resource_type.as_deref(), Some("user"));
        assert_eq!(event.resource_id.as_deref(), Some("u-2"));
        assert_eq!(event.details["reason"], "missing_permission");
        assert_eq!(event.client_ip.as_deref(), Some("10.0.0.1"));
        assert!(event.user_agent.is_none());
        assert!(!event.id.is_empty());
    }

    #[test]
    fn event_ids_are_unique() {
        let a = AuditEvent::new(AuditEventType::AuthFailure, "authenticate");
        let b = AuditEvent::new(AuditEventType::AuthFailure, "authenticate");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&AuditEventType::AuthFailure).expect("json"),
            "\"auth_failure\""
        );
        assert_eq!(AuditEventType::QuotaExceeded.to_string(), "quota_exceeded");
        let parsed: AuditEventType = serde_json::from_str("\"access_denied\"").expect("parse");
        assert_eq!(parsed, AuditEventType::AccessDenied);
    }
}
