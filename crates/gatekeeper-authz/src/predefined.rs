//! The six roles every deployment starts with.
//!
//! Predefined roles are global (`tenant_id == None`) and have fixed ids of the
//! form `role-<name>`, so seeding them twice produces identical records.
use crate::{Permission, Role, RoleType};
use chrono::{DateTime, Utc};

pub const PLATFORM_ADMIN: &str = "platform-admin";
pub const TENANT_ADMIN: &str = "tenant-admin";
pub const OWNER: &str = "owner";
pub const ADMIN: &str = "admin";
pub const OPERATOR: &str = "operator";
pub const VIEWER: &str = "viewer";

pub const NAMES: [&str; 6] = [PLATFORM_ADMIN, TENANT_ADMIN, OWNER, ADMIN, OPERATOR, VIEWER];

const CRUD: [&str; 4] = ["read", "create", "update", "delete"];
const MANAGED_RESOURCES: [&str; 3] = ["subscriptions", "resource_pools", "deployments"];

pub fn role_id(name: &str) -> String {
    format!("role-{name}")
}

/// Build the predefined role set, stamped with `now`.
pub fn default_roles(now: DateTime<Utc>) -> Vec<Role> {
    let role = |name: &str, role_type, permissions: Vec<Permission>, description: &str| Role {
        id: role_id(name),
        name: name.to_string(),
        role_type,
        permissions: permissions.into_iter().collect(),
        tenant_id: None,
        description: description.to_string(),
        created_at: now,
        updated_at: now,
    };

    let mut platform = grants(&["tenants", "users", "roles"], &CRUD);
    platform.extend(grants(&MANAGED_RESOURCES, &CRUD));
    platform.extend(grants(&["audit"], &["read"]));

    let mut tenant_admin = grants(&["tenants"], &["read", "update"]);
    tenant_admin.extend(grants(&["users", "roles"], &CRUD));
    tenant_admin.extend(grants(&MANAGED_RESOURCES, &CRUD));
    tenant_admin.extend(grants(&["audit"], &["read"]));

    let mut admin = grants(&["tenants", "roles", "audit"], &["read"]);
    admin.extend(grants(&["users"], &["read", "create", "update"]));
    admin.extend(grants(&MANAGED_RESOURCES, &CRUD));

    let mut operator = grants(&["tenants", "users"], &["read"]);
    operator.extend(grants(&MANAGED_RESOURCES, &["read", "create", "update"]));

    let mut viewer = grants(&["tenants"], &["read"]);
    viewer.extend(grants(&MANAGED_RESOURCES, &["read"]));

    vec![
        role(
            PLATFORM_ADMIN,
            RoleType::Platform,
            platform,
            "Full access to every tenant and platform operation",
        ),
        role(
            TENANT_ADMIN,
            RoleType::Tenant,
            tenant_admin.clone(),
            "Full administrative access within a tenant",
        ),
        role(
            OWNER,
            RoleType::Tenant,
            tenant_admin,
            "Tenant owner with full access to tenant resources",
        ),
        role(
            ADMIN,
            RoleType::Tenant,
            admin,
            "Manages tenant resources and users",
        ),
        role(
            OPERATOR,
            RoleType::Tenant,
            operator,
            "Operates tenant resources without user management",
        ),
        role(
            VIEWER,
            RoleType::Tenant,
            viewer,
            "Read-only access to tenant resources",
        ),
    ]
}

fn grants(resources: &[&str], actions: &[&str]) -> Vec<Permission> {
    resources
        .iter()
        .flat_map(|resource| actions.iter().map(move |action| (*resource, *action)))
        .filter_map(|(resource, action)| Permission::new(resource, action).ok())
        .collect()
}
