//! In-memory implementation of the identity store.
//!
//! # Purpose
//! Implements [`IdentityStore`] entirely in memory. It exists for local
//! development, tests, and single-instance deployments where durability is
//! not required.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Atomic multi-index writes**: every map and index lives in one `State`
//!   behind a single `tokio::sync::RwLock`. An operation that touches several
//!   indices (user creation, quota increment, deletes) runs inside one write
//!   critical section, so readers never observe a half-applied change and two
//!   writers never interleave a check with a write.
//!
//! # Audit retention
//! Events are indexed by `(timestamp, id)` in ordered sets. Every `log_event`
//! trims entries older than the retention window from all indices and drops
//! the primary records that fell out; reads additionally ignore anything
//! older than the cutoff.
use super::{
    IdentityStore, ListOptions, StoreConfig, StoreError, StoreResult, observed,
    validate_identifier, validate_subject,
};
use crate::model::{
    AuditEvent, AuditEventType, ResourceClass, Role, RoleUpdate, Tenant, TenantUpdate,
    TenantUsage, TenantUser, UserUpdate, apply_role_update,
};
use crate::observability::{NoopObserver, Observer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatekeeper_authz::predefined;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

type AuditKey = (DateTime<Utc>, String);

#[derive(Debug, Default)]
struct AuditLog {
    events: HashMap<String, AuditEvent>,
    global: BTreeSet<AuditKey>,
    by_tenant: HashMap<String, BTreeSet<AuditKey>>,
    by_user: HashMap<String, BTreeSet<AuditKey>>,
    by_type: HashMap<AuditEventType, BTreeSet<AuditKey>>,
}

impl AuditLog {
    fn insert(&mut self, event: AuditEvent) {
        let key = (event.timestamp, event.id.clone());
        self.global.insert(key.clone());
        if let Some(tenant_id) = &event.tenant_id {
            self.by_tenant
                .entry(tenant_id.clone())
                .or_default()
                .insert(key.clone());
        }
        if let Some(user_id) = &event.user_id {
            self.by_user
                .entry(user_id.clone())
                .or_default()
                .insert(key.clone());
        }
        self.by_type
            .entry(event.event_type)
            .or_default()
            .insert(key);
        self.events.insert(event.id.clone(), event);
    }

    /// Drop every index entry and primary record older than `cutoff`.
    fn trim(&mut self, cutoff: DateTime<Utc>) {
        let floor = (cutoff, String::new());
        let expired = split_expired(&mut self.global, &floor);
        for (_, id) in &expired {
            self.events.remove(id);
        }
        for index in self
            .by_tenant
            .values_mut()
            .chain(self.by_user.values_mut())
            .chain(self.by_type.values_mut())
        {
            split_expired(index, &floor);
        }
        self.by_tenant.retain(|_, index| !index.is_empty());
        self.by_user.retain(|_, index| !index.is_empty());
        self.by_type.retain(|_, index| !index.is_empty());
    }

    fn page(
        &self,
        index: Option<&BTreeSet<AuditKey>>,
        cutoff: DateTime<Utc>,
        options: ListOptions,
    ) -> Vec<AuditEvent> {
        let Some(index) = index else {
            return Vec::new();
        };
        index
            .iter()
            .rev()
            .take_while(|(timestamp, _)| *timestamp >= cutoff)
            .skip(options.offset)
            .take(options.effective_limit())
            .filter_map(|(_, id)| self.events.get(id).cloned())
            .collect()
    }
}

/// Remove and return the entries strictly below `floor`.
fn split_expired(index: &mut BTreeSet<AuditKey>, floor: &AuditKey) -> BTreeSet<AuditKey> {
    let kept = index.split_off(floor);
    std::mem::replace(index, kept)
}

#[derive(Debug, Default)]
struct State {
    tenants: HashMap<String, Tenant>,
    users: HashMap<String, TenantUser>,
    /// Normalized subject to user id.
    users_by_subject: HashMap<String, String>,
    tenant_users: HashMap<String, HashSet<String>>,
    roles: HashMap<String, Role>,
    /// `Role::scope_key` to role id.
    role_names: HashMap<String, String>,
    audit: AuditLog,
}

impl State {
    fn tenant_mut(&mut self, tenant_id: &str) -> StoreResult<&mut Tenant> {
        self.tenants
            .get_mut(tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))
    }

    fn insert_role(&mut self, role: Role) -> StoreResult<Role> {
        if self.roles.contains_key(&role.id) {
            return Err(StoreError::AlreadyExists(format!("role {}", role.id)));
        }
        let scope_key = role.scope_key();
        if self.role_names.contains_key(&scope_key) {
            return Err(StoreError::AlreadyExists(format!("role name {}", role.name)));
        }
        self.role_names.insert(scope_key, role.id.clone());
        self.roles.insert(role.id.clone(), role.clone());
        Ok(role)
    }

    fn remove_role(&mut self, role_id: &str) -> Option<Role> {
        let role = self.roles.remove(role_id)?;
        let scope_key = role.scope_key();
        if self.role_names.get(&scope_key) == Some(&role.id) {
            self.role_names.remove(&scope_key);
        }
        Some(role)
    }
}

/// In-memory identity store.
pub struct InMemoryStore {
    config: StoreConfig,
    state: RwLock<State>,
    observer: Arc<dyn Observer>,
}

impl InMemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    pub fn with_observer(config: StoreConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
            observer,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn create_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        observed(self.observer.as_ref(), "create_tenant", async {
            validate_identifier("tenant", &tenant.id)?;
            let mut state = self.state.write().await;
            if state.tenants.contains_key(&tenant.id) {
                return Err(StoreError::AlreadyExists(format!("tenant {}", tenant.id)));
            }
            state.tenants.insert(tenant.id.clone(), tenant.clone());
            Ok(tenant)
        })
        .await
    }

    async fn get_tenant(&self, tenant_id: &str) -> StoreResult<Tenant> {
        observed(self.observer.as_ref(), "get_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            self.state
                .read()
                .await
                .tenants
                .get(tenant_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))
        })
        .await
    }

    async fn update_tenant(&self, tenant_id: &str, update: TenantUpdate) -> StoreResult<Tenant> {
        observed(self.observer.as_ref(), "update_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            let mut state = self.state.write().await;
            let tenant = state.tenant_mut(tenant_id)?;
            tenant.apply(update, Utc::now());
            Ok(tenant.clone())
        })
        .await
    }

    async fn delete_tenant(&self, tenant_id: &str) -> StoreResult<()> {
        observed(self.observer.as_ref(), "delete_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            let mut state = self.state.write().await;
            if !state.tenants.contains_key(tenant_id) {
                return Err(StoreError::NotFound(format!("tenant {tenant_id}")));
            }
            if state
                .tenant_users
                .get(tenant_id)
                .is_some_and(|users| !users.is_empty())
            {
                return Err(StoreError::Conflict(format!(
                    "tenant {tenant_id} still has users"
                )));
            }
            state.tenants.remove(tenant_id);
            state.tenant_users.remove(tenant_id);
            let custom: Vec<String> = state
                .roles
                .values()
                .filter(|role| role.tenant_id.as_deref() == Some(tenant_id))
                .map(|role| role.id.clone())
                .collect();
            for role_id in custom {
                state.remove_role(&role_id);
            }
            Ok(())
        })
        .await
    }

    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        observed(self.observer.as_ref(), "list_tenants", async {
            let mut tenants: Vec<Tenant> =
                self.state.read().await.tenants.values().cloned().collect();
            tenants.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(tenants)
        })
        .await
    }

    async fn increment_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage> {
        observed(self.observer.as_ref(), "increment_usage", async {
            validate_identifier("tenant", tenant_id)?;
            let mut state = self.state.write().await;
            let tenant = state.tenant_mut(tenant_id)?;
            if !tenant.is_active() {
                return Err(StoreError::TenantInactive(tenant_id.to_string()));
            }
            if !tenant.can_create(class) {
                return Err(StoreError::QuotaExceeded {
                    tenant_id: tenant_id.to_string(),
                    class,
                });
            }
            *tenant.usage.get_mut(class) += 1;
            tenant.updated_at = Utc::now();
            Ok(tenant.usage.clone())
        })
        .await
    }

    async fn decrement_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage> {
        observed(self.observer.as_ref(), "decrement_usage", async {
            validate_identifier("tenant", tenant_id)?;
            let mut state = self.state.write().await;
            let tenant = state.tenant_mut(tenant_id)?;
            let used = tenant.usage.get_mut(class);
            if *used > 0 {
                *used -= 1;
                tenant.updated_at = Utc::now();
            }
            Ok(tenant.usage.clone())
        })
        .await
    }

    async fn create_user(&self, user: TenantUser) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "create_user", async {
            validate_identifier("user", &user.id)?;
            validate_identifier("tenant", &user.tenant_id)?;
            validate_subject(&user.subject)?;
            let mut state = self.state.write().await;
            if !state.tenants.contains_key(&user.tenant_id) {
                return Err(StoreError::NotFound(format!("tenant {}", user.tenant_id)));
            }
            if state.users.contains_key(&user.id) {
                return Err(StoreError::AlreadyExists(format!("user {}", user.id)));
            }
            if state.users_by_subject.contains_key(&user.subject) {
                return Err(StoreError::AlreadyExists(format!(
                    "subject {}",
                    user.subject
                )));
            }
            let tenant = state.tenant_mut(&user.tenant_id)?;
            if !tenant.is_active() {
                return Err(StoreError::TenantInactive(user.tenant_id.clone()));
            }
            if !tenant.can_create(ResourceClass::Users) {
                return Err(StoreError::QuotaExceeded {
                    tenant_id: user.tenant_id.clone(),
                    class: ResourceClass::Users,
                });
            }
            tenant.usage.users += 1;
            tenant.updated_at = Utc::now();

            state
                .users_by_subject
                .insert(user.subject.clone(), user.id.clone());
            state
                .tenant_users
                .entry(user.tenant_id.clone())
                .or_default()
                .insert(user.id.clone());
            state.users.insert(user.id.clone(), user.clone());
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "get_user", async {
            validate_identifier("user", user_id)?;
            self.state
                .read()
                .await
                .users
                .get(user_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
        })
        .await
    }

    async fn get_user_by_subject(&self, subject: &str) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "get_user_by_subject", async {
            let state = self.state.read().await;
            state
                .users_by_subject
                .get(subject)
                .and_then(|user_id| state.users.get(user_id))
                .cloned()
                .ok_or_else(|| StoreError::NotFound("user for subject".to_string()))
        })
        .await
    }

    async fn update_user(&self, user_id: &str, update: UserUpdate) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "update_user", async {
            validate_identifier("user", user_id)?;
            let mut state = self.state.write().await;
            let user = state
                .users
                .get_mut(user_id)
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
            user.apply(update, Utc::now());
            Ok(user.clone())
        })
        .await
    }

    async fn update_last_login(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        observed(self.observer.as_ref(), "update_last_login", async {
            validate_identifier("user", user_id)?;
            let mut state = self.state.write().await;
            let user = state
                .users
                .get_mut(user_id)
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
            user.last_login_at = Some(at);
            Ok(())
        })
        .await
    }

    async fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        observed(self.observer.as_ref(), "delete_user", async {
            validate_identifier("user", user_id)?;
            let mut state = self.state.write().await;
            let user = state
                .users
                .remove(user_id)
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
            if state.users_by_subject.get(&user.subject) == Some(&user.id) {
                state.users_by_subject.remove(&user.subject);
            }
            if let Some(members) = state.tenant_users.get_mut(&user.tenant_id) {
                members.remove(&user.id);
            }
            if let Some(tenant) = state.tenants.get_mut(&user.tenant_id) {
                if tenant.usage.users > 0 {
                    tenant.usage.users -= 1;
                    tenant.updated_at = Utc::now();
                }
            }
            Ok(())
        })
        .await
    }

    async fn list_users_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<TenantUser>> {
        observed(self.observer.as_ref(), "list_users_by_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            let state = self.state.read().await;
            let mut users: Vec<TenantUser> = state
                .tenant_users
                .get(tenant_id)
                .into_iter()
                .flatten()
                .filter_map(|user_id| {
                    let user = state.users.get(user_id).cloned();
                    if user.is_none() {
                        tracing::warn!(%tenant_id, %user_id, "tenant membership references missing user");
                    }
                    user
                })
                .collect();
            users.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(users)
        })
        .await
    }

    async fn create_role(&self, role: Role) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "create_role", async {
            validate_identifier("role", &role.id)?;
            let mut state = self.state.write().await;
            if let Some(tenant_id) = &role.tenant_id {
                validate_identifier("tenant", tenant_id)?;
                if !state.tenants.contains_key(tenant_id) {
                    return Err(StoreError::NotFound(format!("tenant {tenant_id}")));
                }
            }
            state.insert_role(role)
        })
        .await
    }

    async fn get_role(&self, role_id: &str) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "get_role", async {
            validate_identifier("role", role_id)?;
            self.state
                .read()
                .await
                .roles
                .get(role_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))
        })
        .await
    }

    async fn get_role_by_name(&self, tenant_id: Option<&str>, name: &str) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "get_role_by_name", async {
            let state = self.state.read().await;
            state
                .role_names
                .get(&Role::scope_key_for(tenant_id, name))
                .and_then(|role_id| state.roles.get(role_id))
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("role {name}")))
        })
        .await
    }

    async fn update_role(&self, role_id: &str, update: RoleUpdate) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "update_role", async {
            validate_identifier("role", role_id)?;
            let mut state = self.state.write().await;
            let role = state
                .roles
                .get_mut(role_id)
                .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
            apply_role_update(role, update, Utc::now());
            Ok(role.clone())
        })
        .await
    }

    async fn delete_role(&self, role_id: &str) -> StoreResult<()> {
        observed(self.observer.as_ref(), "delete_role", async {
            validate_identifier("role", role_id)?;
            let mut state = self.state.write().await;
            state
                .remove_role(role_id)
                .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
            Ok(())
        })
        .await
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        observed(self.observer.as_ref(), "list_roles", async {
            let mut roles: Vec<Role> = self.state.read().await.roles.values().cloned().collect();
            roles.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(roles)
        })
        .await
    }

    async fn list_roles_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Role>> {
        observed(self.observer.as_ref(), "list_roles_by_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            let mut roles: Vec<Role> = self
                .state
                .read()
                .await
                .roles
                .values()
                .filter(|role| role.tenant_id.as_deref().is_none_or(|id| id == tenant_id))
                .cloned()
                .collect();
            roles.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(roles)
        })
        .await
    }

    async fn initialize_default_roles(&self) -> StoreResult<()> {
        observed(self.observer.as_ref(), "initialize_default_roles", async {
            let mut state = self.state.write().await;
            for role in predefined::default_roles(Utc::now()) {
                match state.insert_role(role) {
                    Ok(_) | Err(StoreError::AlreadyExists(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        })
        .await
    }

    async fn log_event(&self, event: AuditEvent) -> StoreResult<()> {
        observed(self.observer.as_ref(), "log_event", async {
            let cutoff = self.config.audit_cutoff(Utc::now());
            let mut state = self.state.write().await;
            state.audit.insert(event);
            state.audit.trim(cutoff);
            Ok(())
        })
        .await
    }

    async fn list_events(&self, options: ListOptions) -> StoreResult<Vec<AuditEvent>> {
        observed(self.observer.as_ref(), "list_events", async {
            let cutoff = self.config.audit_cutoff(Utc::now());
            let state = self.state.read().await;
            Ok(state.audit.page(Some(&state.audit.global), cutoff, options))
        })
        .await
    }

    async fn list_events_by_tenant(
        &self,
        tenant_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        observed(self.observer.as_ref(), "list_events_by_tenant", async {
            let cutoff = self.config.audit_cutoff(Utc::now());
            let state = self.state.read().await;
            Ok(state
                .audit
                .page(state.audit.by_tenant.get(tenant_id), cutoff, options))
        })
        .await
    }

    async fn list_events_by_type(
        &self,
        event_type: AuditEventType,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        observed(self.observer.as_ref(), "list_events_by_type", async {
            let cutoff = self.config.audit_cutoff(Utc::now());
            let state = self.state.read().await;
            Ok(state
                .audit
                .page(state.audit.by_type.get(&event_type), cutoff, options))
        })
        .await
    }

    async fn list_events_by_user(
        &self,
        user_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        observed(self.observer.as_ref(), "list_events_by_user", async {
            let cutoff = self.config.audit_cutoff(Utc::now());
            let state = self.state.read().await;
            Ok(state
                .audit
                .page(state.audit.by_user.get(user_id), cutoff, options))
        })
        .await
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
