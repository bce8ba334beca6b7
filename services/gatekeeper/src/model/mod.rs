//! Gatekeeper data model.
//!
//! # Purpose
//! Tenant, user and audit records persisted by the store. Roles and
//! permissions live in `gatekeeper-authz` and are re-exported here.
mod audit;
mod tenant;
mod user;

pub use audit::{AuditEvent, AuditEventType};
pub use gatekeeper_authz::{Permission, Role, RoleType};
pub use tenant::{
    ResourceClass, Tenant, TenantQuota, TenantStatus, TenantUpdate, TenantUsage,
    UnknownResourceClass,
};
pub use user::{TenantUser, UserUpdate};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Partial role update. Names are fixed at creation because they are indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub description: Option<String>,
    pub permissions: Option<BTreeSet<Permission>>,
}

pub fn apply_role_update(role: &mut Role, update: RoleUpdate, now: chrono::DateTime<chrono::Utc>) {
    if let Some(description) = update.description {
        role.description = description;
    }
    if let Some(permissions) = update.permissions {
        role.permissions = permissions;
    }
    role.updated_at = now;
}
