use crate::{Permission, Role, RoleType, predefined};
use serde::Serialize;

/// Request-scoped projection of an authenticated caller. Never persisted.
///
/// # Invariants
/// - `is_platform_admin` is derived from the role at construction: role type
///   platform and role name `platform-admin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub tenant_id: String,
    pub subject: String,
    pub common_name: String,
    pub role: Option<Role>,
    pub is_platform_admin: bool,
}

impl AuthenticatedUser {
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        subject: impl Into<String>,
        common_name: impl Into<String>,
        role: Option<Role>,
    ) -> Self {
        let is_platform_admin = role.as_ref().is_some_and(|role| {
            role.role_type == RoleType::Platform && role.name == predefined::PLATFORM_ADMIN
        });
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            subject: subject.into(),
            common_name: common_name.into(),
            role,
            is_platform_admin,
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        if self.is_platform_admin {
            return true;
        }
        self.role
            .as_ref()
            .is_some_and(|role| role.has_permission(permission))
    }

    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role.as_ref().map(|role| role.name.as_str())
    }

    /// Platform admins may act on any tenant; everyone else only on their own.
    pub fn can_access_tenant(&self, tenant_id: &str) -> bool {
        self.is_platform_admin || self.tenant_id == tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn perm(value: &str) -> Permission {
        Permission::parse(value).expect("permission")
    }

    fn predefined_role(name: &str) -> Role {
        predefined::default_roles(Utc::now())
            .into_iter()
            .find(|role| role.name == name)
            .expect("role")
    }

    #[test]
    fn platform_admin_passes_with_empty_permissions() {
        let mut role = predefined_role(predefined::PLATFORM_ADMIN);
        role.permissions.clear();
        let user = AuthenticatedUser::new("u", "t", "CN=root", "root", Some(role));
        assert!(user.is_platform_admin);
        assert!(user.has_permission(&perm("anything:whatsoever")));
        assert!(user.can_access_tenant("some-other-tenant"));
    }

    #[test]
    fn platform_flag_needs_both_type_and_name() {
        let mut renamed = predefined_role(predefined::PLATFORM_ADMIN);
        renamed.name = "platform-operator".to_string();
        let user = AuthenticatedUser::new("u", "t", "CN=x", "x", Some(renamed));
        assert!(!user.is_platform_admin);

        let mut retyped = predefined_role(predefined::PLATFORM_ADMIN);
        retyped.role_type = RoleType::Tenant;
        let user = AuthenticatedUser::new("u", "t", "CN=x", "x", Some(retyped));
        assert!(!user.is_platform_admin);
    }

    #[test]
    fn user_without_role_has_no_permissions() {
        let user = AuthenticatedUser::new("u", "t", "CN=x", "x", None);
        assert!(!user.is_platform_admin);
        assert!(!user.has_permission(&perm("tenants:read")));
        assert!(!user.has_any_permission(&[perm("tenants:read"), perm("users:read")]));
        assert_eq!(user.role_name(), None);
    }

    #[test]
    fn any_permission_delegates_to_role() {
        let user = AuthenticatedUser::new(
            "u",
            "t-1",
            "CN=x",
            "x",
            Some(predefined_role(predefined::VIEWER)),
        );
        assert!(user.has_any_permission(&[perm("users:delete"), perm("tenants:read")]));
        assert!(!user.has_any_permission(&[perm("users:delete"), perm("roles:create")]));
        assert!(!user.has_any_permission(&[]));
        assert!(user.can_access_tenant("t-1"));
        assert!(!user.can_access_tenant("t-2"));
    }
}
