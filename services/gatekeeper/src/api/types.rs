//! Request and response bodies for the admin API.
use crate::model::{AuditEvent, AuditEventType, Tenant, TenantQuota};
use gatekeeper_authz::AuthenticatedUser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of every rejection. `code` mirrors the HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub durable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhoAmIResponse {
    pub request_id: String,
    pub user: AuthenticatedUser,
    pub tenant: Option<Tenant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub quota: Option<TenantQuota>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// New user, identified by the certificate subject DN it will present.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub subject_dn: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    #[serde(default, rename = "type")]
    pub event_type: Option<AuditEventType>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditListResponse {
    pub events: Vec<AuditEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}
