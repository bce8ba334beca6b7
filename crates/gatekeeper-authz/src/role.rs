use crate::{AuthzError, AuthzResult, Permission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Platform,
    Tenant,
}

impl RoleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleType::Platform => "platform",
            RoleType::Tenant => "tenant",
        }
    }
}

/// A named permission set.
///
/// # Invariants
/// - `name` is unique within its scope: the global scope when `tenant_id` is
///   `None`, otherwise the owning tenant.
/// - `permissions` is a set; duplicates collapse on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub role_type: RoleType,
    pub permissions: BTreeSet<Permission>,
    pub tenant_id: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Build a tenant-owned custom role.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidRole`] when the id, name or tenant id is empty.
    pub fn custom(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> AuthzResult<Self> {
        let (id, tenant_id, name) = (id.into(), tenant_id.into(), name.into());
        if id.trim().is_empty() {
            return Err(AuthzError::InvalidRole("id is empty".to_string()));
        }
        if tenant_id.trim().is_empty() {
            return Err(AuthzError::InvalidRole("tenant id is empty".to_string()));
        }
        if name.trim().is_empty() {
            return Err(AuthzError::InvalidRole("name is empty".to_string()));
        }
        Ok(Self {
            id,
            name,
            role_type: RoleType::Tenant,
            permissions: permissions.into_iter().collect(),
            tenant_id: Some(tenant_id),
            description: description.into(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Key used by name indices: `global:<name>` or `tenant:<id>:<name>`.
    pub fn scope_key(&self) -> String {
        Self::scope_key_for(self.tenant_id.as_deref(), &self.name)
    }

    pub fn scope_key_for(tenant_id: Option<&str>, name: &str) -> String {
        match tenant_id {
            None => format!("global:{name}"),
            Some(tenant) => format!("tenant:{tenant}:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(value: &str) -> Permission {
        Permission::parse(value).expect("permission")
    }

    #[test]
    fn has_permission_is_exact_membership() {
        let role = Role::custom(
            "r-1",
            "t-1",
            "deployer",
            [perm("deployments:create"), perm("deployments:create")],
            "",
            Utc::now(),
        )
        .expect("role");
        assert_eq!(role.permissions.len(), 1);
        assert!(role.has_permission(&perm("deployments:create")));
        assert!(!role.has_permission(&perm("deployments:delete")));
        assert!(!role.has_permission(&perm("deployments:creat")));
    }

    #[test]
    fn custom_roles_are_tenant_scoped() {
        let role = Role::custom("r-1", "t-1", "ops", [], "", Utc::now()).expect("role");
        assert_eq!(role.role_type, RoleType::Tenant);
        assert!(!role.is_global());
        assert_eq!(role.scope_key(), "tenant:t-1:ops");
        assert_eq!(Role::scope_key_for(None, "viewer"), "global:viewer");
    }

    #[test]
    fn custom_role_requires_identifiers() {
        assert!(Role::custom("", "t-1", "ops", [], "", Utc::now()).is_err());
        assert!(Role::custom("r-1", " ", "ops", [], "", Utc::now()).is_err());
        assert!(Role::custom("r-1", "t-1", "", [], "", Utc::now()).is_err());
    }

    #[test]
    fn role_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RoleType::Platform).expect("serialize"),
            "\"platform\""
        );
        assert_eq!(RoleType::Tenant.as_str(), "tenant");
    }
}
