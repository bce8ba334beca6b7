//! Tenant records, quotas and usage counters.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    PendingDeletion,
}

impl TenantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::PendingDeletion => "pending_deletion",
        }
    }
}

/// A provisioned resource kind that counts against a tenant quota.
///
/// The string form doubles as the usage field name, and `max_<name>` is the
/// matching quota field; the Redis scripts rely on that pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Subscriptions,
    ResourcePools,
    Deployments,
    Users,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 4] = [
        ResourceClass::Subscriptions,
        ResourceClass::ResourcePools,
        ResourceClass::Deployments,
        ResourceClass::Users,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceClass::Subscriptions => "subscriptions",
            ResourceClass::ResourcePools => "resource_pools",
            ResourceClass::Deployments => "deployments",
            ResourceClass::Users => "users",
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resource class: {0}")]
pub struct UnknownResourceClass(pub String);

impl std::str::FromStr for ResourceClass {
    type Err = UnknownResourceClass;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ResourceClass::ALL
            .into_iter()
            .find(|class| class.as_str() == value)
            .ok_or_else(|| UnknownResourceClass(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantQuota {
    pub max_subscriptions: u64,
    pub max_resource_pools: u64,
    pub max_deployments: u64,
    pub max_users: u64,
    pub max_requests_per_minute: u64,
}

impl Default for TenantQuota {
    fn default() -> Self {
        Self {
            max_subscriptions: 100,
            max_resource_pools: 50,
            max_deployments: 200,
            max_users: 20,
            max_requests_per_minute: 1000,
        }
    }
}

impl TenantQuota {
    pub fn limit(&self, class: ResourceClass) -> u64 {
        match class {
            ResourceClass::Subscriptions => self.max_subscriptions,
            ResourceClass::ResourcePools => self.max_resource_pools,
            ResourceClass::Deployments => self.max_deployments,
            ResourceClass::Users => self.max_users,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUsage {
    pub subscriptions: u64,
    pub resource_pools: u64,
    pub deployments: u64,
    pub users: u64,
}

impl TenantUsage {
    pub fn get(&self, class: ResourceClass) -> u64 {
        match class {
            ResourceClass::Subscriptions => self.subscriptions,
            ResourceClass::ResourcePools => self.resource_pools,
            ResourceClass::Deployments => self.deployments,
            ResourceClass::Users => self.users,
        }
    }

    pub fn get_mut(&mut self, class: ResourceClass) -> &mut u64 {
        match class {
            ResourceClass::Subscriptions => &mut self.subscriptions,
            ResourceClass::ResourcePools => &mut self.resource_pools,
            ResourceClass::Deployments => &mut self.deployments,
            ResourceClass::Users => &mut self.users,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub status: TenantStatus,
    pub quota: TenantQuota,
    pub usage: TenantUsage,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// New active tenant with default quota and zero usage.
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TenantStatus::Active,
            quota: TenantQuota::default(),
            usage: TenantUsage::default(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Point-in-time check only. Stores re-evaluate this together with the
    /// increment; callers must not use it as a reservation.
    pub fn can_create(&self, class: ResourceClass) -> bool {
        self.is_active() && self.usage.get(class) < self.quota.limit(class)
    }

    pub fn apply(&mut self, update: TenantUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(quota) = update.quota {
            self.quota = quota;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        self.updated_at = now;
    }
}

/// Partial tenant update. `id`, `usage` and timestamps are not updatable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
    pub quota: Option<TenantQuota>,
    pub metadata: Option<HashMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tenant_uses_default_quota() {
        let tenant = Tenant::new("acme", "Acme", Utc::now());
        assert!(tenant.is_active());
        assert_eq!(tenant.quota.max_subscriptions, 100);
        assert_eq!(tenant.quota.max_resource_pools, 50);
        assert_eq!(tenant.quota.max_deployments, 200);
        assert_eq!(tenant.quota.max_users, 20);
        assert_eq!(tenant.quota.max_requests_per_minute, 1000);
        assert_eq!(tenant.usage, TenantUsage::default());
    }

    #[test]
    fn can_create_requires_active_and_headroom() {
        let mut tenant = Tenant::new("acme", "Acme", Utc::now());
        tenant.quota.max_deployments = 2;
        tenant.usage.deployments = 1;
        assert!(tenant.can_create(ResourceClass::Deployments));
        tenant.usage.deployments = 2;
        assert!(!tenant.can_create(ResourceClass::Deployments));
        tenant.usage.deployments = 0;
        tenant.status = TenantStatus::Suspended;
        assert!(!tenant.can_create(ResourceClass::Deployments));
    }

    #[test]
    fn resource_class_parsing() {
        for class in ResourceClass::ALL {
            assert_eq!(class.as_str().parse::<ResourceClass>(), Ok(class));
        }
        assert_eq!(
            "widgets".parse::<ResourceClass>(),
            Err(UnknownResourceClass("widgets".to_string()))
        );
    }

    #[test]
    fn usage_field_names_match_class_names() {
        let usage = serde_json::to_value(TenantUsage::default()).expect("usage");
        let quota = serde_json::to_value(TenantQuota::default()).expect("quota");
        for class in ResourceClass::ALL {
            assert!(usage.get(class.as_str()).is_some(), "{class}");
            assert!(quota.get(format!("max_{class}")).is_some(), "{class}");
        }
    }

    #[test]
    fn apply_update_touches_only_given_fields() {
        let created = Utc::now();
        let mut tenant = Tenant::new("acme", "Acme", created);
        let later = created + chrono::Duration::seconds(5);
        tenant.apply(
            TenantUpdate {
                status: Some(TenantStatus::Suspended),
                ..TenantUpdate::default()
            },
            later,
        );
        assert_eq!(tenant.name, "Acme");
        assert_eq!(tenant.status, TenantStatus::Suspended);
        assert_eq!(tenant.created_at, created);
        assert_eq!(tenant.updated_at, later);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TenantStatus::PendingDeletion).expect("json"),
            "\"pending_deletion\""
        );
        assert_eq!(TenantStatus::Suspended.as_str(), "suspended");
    }
}
