//! Identity storage port.
//!
//! # Purpose
//! [`IdentityStore`] is the single persistence seam for tenants, users, roles
//! and audit events. The pipeline, guards and admin API only ever talk to the
//! trait object, so backends can be swapped without touching them.
//!
//! # Key invariants
//! - Read-then-conditional-write operations (create with uniqueness, quota
//!   increment, user creation against the users quota) are atomic inside the
//!   backend. Callers never check-then-write.
//! - `StoreError::Unavailable` is the only retryable error.
//! - List operations skip missing or undecodable entries with a warning.
use crate::model::{
    AuditEvent, AuditEventType, ResourceClass, Role, RoleUpdate, Tenant, TenantUpdate,
    TenantUsage, TenantUser, UnknownResourceClass, UserUpdate,
};
use crate::observability::Observer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod memory;
pub mod redis;
pub mod testing;

pub const DEFAULT_AUDIT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 1000;
const MAX_IDENTIFIER_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub audit_retention: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            audit_retention: DEFAULT_AUDIT_RETENTION,
        }
    }
}

impl StoreConfig {
    /// Oldest timestamp still inside the retention window.
    pub fn audit_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cutoff = chrono::Duration::from_std(self.audit_retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention));
        match cutoff {
            Some(cutoff) => cutoff,
            None => {
                tracing::warn!(
                    retention = ?self.audit_retention,
                    "audit retention out of range; keeping every event"
                );
                DateTime::<Utc>::MIN_UTC
            }
        }
    }
}

/// Offset pagination for audit listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListOptions {
    pub fn new(limit: Option<usize>, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Zero or absent means the default; anything above the cap is clamped.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            None | Some(0) => DEFAULT_LIST_LIMIT,
            Some(limit) => limit.min(MAX_LIST_LIMIT),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("quota exceeded for {class} in tenant {tenant_id}")]
    QuotaExceeded {
        tenant_id: String,
        class: ResourceClass,
    },
    #[error("tenant {0} is not active")]
    TenantInactive(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("invalid resource class: {0}")]
    InvalidResourceClass(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    /// Only connectivity-class failures may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::AlreadyExists(_) => "already_exists",
            StoreError::QuotaExceeded { .. } => "quota_exceeded",
            StoreError::TenantInactive(_) => "tenant_inactive",
            StoreError::Conflict(_) => "conflict",
            StoreError::InvalidIdentifier(_) => "invalid_identifier",
            StoreError::InvalidResourceClass(_) => "invalid_resource_class",
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<UnknownResourceClass> for StoreError {
    fn from(err: UnknownResourceClass) -> Self {
        StoreError::InvalidResourceClass(err.0)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_tenant(&self, tenant: Tenant) -> StoreResult<Tenant>;
    async fn get_tenant(&self, tenant_id: &str) -> StoreResult<Tenant>;
    async fn update_tenant(&self, tenant_id: &str, update: TenantUpdate) -> StoreResult<Tenant>;
    /// Refuses with `Conflict` while the tenant still has users.
    async fn delete_tenant(&self, tenant_id: &str) -> StoreResult<()>;
    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>>;
    /// Atomic check-and-increment against the tenant quota.
    async fn increment_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage>;
    /// Floors at zero.
    async fn decrement_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage>;

    /// Registers the user and consumes one unit of the tenant `users` quota.
    async fn create_user(&self, user: TenantUser) -> StoreResult<TenantUser>;
    async fn get_user(&self, user_id: &str) -> StoreResult<TenantUser>;
    async fn get_user_by_subject(&self, subject: &str) -> StoreResult<TenantUser>;
    async fn update_user(&self, user_id: &str, update: UserUpdate) -> StoreResult<TenantUser>;
    async fn update_last_login(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()>;
    /// Removes the user and its indices, and releases its `users` quota unit.
    async fn delete_user(&self, user_id: &str) -> StoreResult<()>;
    async fn list_users_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<TenantUser>>;

    async fn create_role(&self, role: Role) -> StoreResult<Role>;
    async fn get_role(&self, role_id: &str) -> StoreResult<Role>;
    async fn get_role_by_name(&self, tenant_id: Option<&str>, name: &str) -> StoreResult<Role>;
    async fn update_role(&self, role_id: &str, update: RoleUpdate) -> StoreResult<Role>;
    async fn delete_role(&self, role_id: &str) -> StoreResult<()>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    /// Tenant custom roles plus every global role.
    async fn list_roles_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Role>>;
    async fn initialize_default_roles(&self) -> StoreResult<()>;

    async fn log_event(&self, event: AuditEvent) -> StoreResult<()>;
    async fn list_events(&self, options: ListOptions) -> StoreResult<Vec<AuditEvent>>;
    async fn list_events_by_tenant(
        &self,
        tenant_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>>;
    async fn list_events_by_type(
        &self,
        event_type: AuditEventType,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>>;
    async fn list_events_by_user(
        &self,
        user_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Identifiers become key segments in the Redis layout, so `:` and
/// whitespace are refused for every backend.
pub fn validate_identifier(kind: &str, value: &str) -> StoreResult<()> {
    let valid = !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(format!("{kind} id {value:?}")))
    }
}

pub(crate) fn validate_subject(subject: &str) -> StoreResult<()> {
    if subject.trim().is_empty() {
        return Err(StoreError::InvalidIdentifier("empty subject".to_string()));
    }
    Ok(())
}

/// Run a store operation and report its outcome and latency.
pub(crate) async fn observed<T, F>(observer: &dyn Observer, op: &'static str, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let started = Instant::now();
    let result = fut.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    observer.store_operation(op, outcome, started.elapsed());
    result
}
