//! Fault-injecting store for tests.
//!
//! [`FaultyStore`] delegates to a real backend and fails or stalls selected
//! operations by name, so callers can exercise their storage-error and
//! timeout branches without a broken database.
use super::memory::InMemoryStore;
use super::{IdentityStore, ListOptions, StoreError, StoreResult};
use crate::model::{
    AuditEvent, AuditEventType, ResourceClass, Role, RoleUpdate, Tenant, TenantUpdate,
    TenantUsage, TenantUser, UserUpdate,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unavailable,
    Unexpected,
    /// Sleep before delegating.
    Stall(Duration),
}

pub struct FaultyStore {
    inner: Arc<dyn IdentityStore>,
    faults: Mutex<HashMap<&'static str, Fault>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn IdentityStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory store whose every operation reports `Unavailable`.
    pub fn unavailable() -> Self {
        let store = Self::new(Arc::new(InMemoryStore::default()));
        store.fail_all(Fault::Unavailable);
        store
    }

    pub fn inner(&self) -> &Arc<dyn IdentityStore> {
        &self.inner
    }

    pub fn fail(&self, op: &'static str, fault: Fault) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(op, fault);
        }
    }

    pub fn fail_all(&self, fault: Fault) {
        self.fail("*", fault);
    }

    pub fn clear(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    async fn check(&self, op: &'static str) -> StoreResult<()> {
        let fault = self
            .faults
            .lock()
            .ok()
            .and_then(|faults| faults.get(op).or_else(|| faults.get("*")).copied());
        match fault {
            None => Ok(()),
            Some(Fault::Unavailable) => Err(StoreError::Unavailable(format!("injected: {op}"))),
            Some(Fault::Unexpected) => Err(StoreError::Unexpected(anyhow!("injected: {op}"))),
            Some(Fault::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl IdentityStore for FaultyStore {
    async fn create_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        self.check("create_tenant").await?;
        self.inner.create_tenant(tenant).await
    }

    async fn get_tenant(&self, tenant_id: &str) -> StoreResult<Tenant> {
        self.check("get_tenant").await?;
        self.inner.get_tenant(tenant_id).await
    }

    async fn update_tenant(&self, tenant_id: &str, update: TenantUpdate) -> StoreResult<Tenant> {
        self.check("update_tenant").await?;
        self.inner.update_tenant(tenant_id, update).await
    }

    async fn delete_tenant(&self, tenant_id: &str) -> StoreResult<()> {
        self.check("delete_tenant").await?;
        self.inner.delete_tenant(tenant_id).await
    }

    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        self.check("list_tenants").await?;
        self.inner.list_tenants().await
    }

    async fn increment_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage> {
        self.check("increment_usage").await?;
        self.inner.increment_usage(tenant_id, class).await
    }

    async fn decrement_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage> {
        self.check("decrement_usage").await?;
        self.inner.decrement_usage(tenant_id, class).await
    }

    async fn create_user(&self, user: TenantUser) -> StoreResult<TenantUser> {
        self.check("create_user").await?;
        self.inner.create_user(user).await
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<TenantUser> {
        self.check("get_user").await?;
        self.inner.get_user(user_id).await
    }

    async fn get_user_by_subject(&self, subject: &str) -> StoreResult<TenantUser> {
        self.check("get_user_by_subject").await?;
        self.inner.get_user_by_subject(subject).await
    }

    async fn update_user(&self, user_id: &str, update: UserUpdate) -> StoreResult<TenantUser> {
        self.check("update_user").await?;
        self.inner.update_user(user_id, update).await
    }

    async fn update_last_login(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.check("update_last_login").await?;
        self.inner.update_last_login(user_id, at).await
    }

    async fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        self.check("delete_user").await?;
        self.inner.delete_user(user_id).await
    }

    async fn list_users_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<TenantUser>> {
        self.check("list_users_by_tenant").await?;
        self.inner.list_users_by_tenant(tenant_id).await
    }

    async fn create_role(&self, role: Role) -> StoreResult<Role> {
        self.check("create_role").await?;
        self.inner.create_role(role).await
    }

    async fn get_role(&self, role_id: &str) -> StoreResult<Role> {
        self.check("get_role").await?;
        self.inner.get_role(role_id).await
    }

    async fn get_role_by_name(&self, tenant_id: Option<&str>, name: &str) -> StoreResult<Role> {
        self.check("get_role_by_name").await?;
        self.inner.get_role_by_name(tenant_id, name).await
    }

    async fn update_role(&self, role_id: &str, update: RoleUpdate) -> StoreResult<Role> {
        self.check("update_role").await?;
        self.inner.update_role(role_id, update).await
    }

    async fn delete_role(&self, role_id: &str) -> StoreResult<()> {
        self.check("delete_role").await?;
        self.inner.delete_role(role_id).await
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        self.check("list_roles").await?;
        self.inner.list_roles().await
    }

    async fn list_roles_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Role>> {
        self.check("list_roles_by_tenant").await?;
        self.inner.list_roles_by_tenant(tenant_id).await
    }

    async fn initialize_default_roles(&self) -> StoreResult<()> {
        self.check("initialize_default_roles").await?;
        self.inner.initialize_default_roles().await
    }

    async fn log_event(&self, event: AuditEvent) -> StoreResult<()> {
        self.check("log_event").await?;
        self.inner.log_event(event).await
    }

    async fn list_events(&self, options: ListOptions) -> StoreResult<Vec<AuditEvent>> {
        self.check("list_events").await?;
        self.inner.list_events(options).await
    }

    async fn list_events_by_tenant(
        &self,
        tenant_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        self.check("list_events_by_tenant").await?;
        self.inner.list_events_by_tenant(tenant_id, options).await
    }

    async fn list_events_by_type(
        &self,
        event_type: AuditEventType,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        self.check("list_events_by_type").await?;
        self.inner.list_events_by_type(event_type, options).await
    }

    async fn list_events_by_user(
        &self,
        user_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        self.check("list_events_by_user").await?;
        self.inner.list_events_by_user(user_id, options).await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.check("health_check").await?;
        self.inner.health_check().await
    }

    fn is_durable(&self) -> bool {
        self.inner.is_durable()
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn faults_apply_per_operation() {
        let store = FaultyStore::new(Arc::new(InMemoryStore::default()));
        store.fail("get_tenant", Fault::Unexpected);
        assert!(matches!(
            store.get_tenant("acme").await,
            Err(StoreError::Unexpected(_))
        ));
        assert!(store.list_tenants().await.expect("list").is_empty());

        store.clear();
        assert!(matches!(
            store.get_tenant("acme").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn wildcard_fault_covers_everything() {
        let store = FaultyStore::unavailable();
        assert!(matches!(
            store.health_check().await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.backend_name(), "memory");
    }
}
