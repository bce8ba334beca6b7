//! Redis implementation of the identity store.
//!
//! # Purpose
//! Durable, shareable backend used when several gateway instances must see
//! the same tenants, users and roles.
//!
//! # Key layout
//! Every key starts with the configured prefix `P`:
//! - `P:tenant:<id>` tenant JSON, `P:tenants` set of tenant ids
//! - `P:tenant:<id>:users` / `P:tenant:<id>:roles` membership sets
//! - `P:user:<id>` user JSON, `P:users:subject` hash subject -> user id
//! - `P:role:<id>` role JSON, `P:roles` / `P:roles:global` sets,
//!   `P:roles:names` hash scope key -> role id
//! - `P:audit:event:<id>` event JSON with a TTL equal to the retention window
//! - `P:audit:index`, `P:audit:tenant:<id>`, `P:audit:user:<id>`,
//!   `P:audit:type:<type>` sorted sets scored by event time in milliseconds
//!
//! # Key invariants
//! - Multi-key writes run as Lua scripts so index and primary records change
//!   together. Scripts answer with a status table (`{'ok', ...}` or a failure
//!   tag) that is mapped back onto [`StoreError`].
//! - Read-modify-write updates use a compare-and-set script and retry a
//!   bounded number of times before reporting `Conflict`.
//! - Connectivity failures surface as `StoreError::Unavailable`; undecodable
//!   payloads as `StoreError::Unexpected`.
use super::{
    IdentityStore, ListOptions, StoreConfig, StoreError, StoreResult, observed,
    validate_identifier, validate_subject,
};
use crate::config::RedisConfig;
use crate::model::{
    AuditEvent, AuditEventType, ResourceClass, Role, RoleUpdate, Tenant, TenantUpdate,
    TenantUsage, TenantUser, UserUpdate, apply_role_update,
};
use crate::observability::Observer;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, RedisError, Script, ScriptInvocation};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use gatekeeper_authz::predefined;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

const MAX_CAS_ATTEMPTS: usize = 8;

const CREATE_TENANT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return {'exists'}
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SADD', KEYS[2], ARGV[1])
return {'ok'}
"#;

// KEYS: tenant, tenants, tenant users, tenant roles, role names, all roles
// ARGV: tenant id, role key prefix
// Role record keys are derived from ARGV[2], so the keyspace must live on one node.
const DELETE_TENANT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {'not_found'}
end
if redis.call('SCARD', KEYS[3]) > 0 then
  return {'has_users'}
end
for _, role_id in ipairs(redis.call('SMEMBERS', KEYS[4])) do
  local raw = redis.call('GET', ARGV[2] .. role_id)
  if raw then
    local scope = 'tenant:' .. ARGV[1] .. ':' .. cjson.decode(raw).name
    if redis.call('HGET', KEYS[5], scope) == role_id then
      redis.call('HDEL', KEYS[5], scope)
    end
    redis.call('DEL', ARGV[2] .. role_id)
  end
  redis.call('SREM', KEYS[6], role_id)
end
redis.call('DEL', KEYS[1], KEYS[3], KEYS[4])
redis.call('SREM', KEYS[2], ARGV[1])
return {'ok'}
"#;

// ARGV: class, delta ("1" or "-1"), updated_at
const ADJUST_USAGE: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {'not_found'}
end
local tenant = cjson.decode(raw)
local used = tonumber(tenant.usage[ARGV[1]]) or 0
if ARGV[2] == '1' then
  if tenant.status ~= 'active' then
    return {'inactive'}
  end
  local limit = tonumber(tenant.quota['max_' .. ARGV[1]]) or 0
  if used >= limit then
    return {'quota_exceeded'}
  end
  used = used + 1
elseif used > 0 then
  used = used - 1
else
  return {'ok', cjson.encode(tenant.usage)}
end
tenant.usage[ARGV[1]] = used
tenant.updated_at = ARGV[3]
redis.call('SET', KEYS[1], cjson.encode(tenant))
return {'ok', cjson.encode(tenant.usage)}
"#;

// KEYS: user, subject index, tenant, tenant users
// ARGV: user id, subject, user json, updated_at
const CREATE_USER: &str = r#"
local raw = redis.call('GET', KEYS[3])
if not raw then
  return {'tenant_not_found'}
end
if redis.call('EXISTS', KEYS[1]) == 1 then
  return {'user_exists'}
end
if redis.call('HEXISTS', KEYS[2], ARGV[2]) == 1 then
  return {'subject_exists'}
end
local tenant = cjson.decode(raw)
if tenant.status ~= 'active' then
  return {'inactive'}
end
local used = tonumber(tenant.usage.users) or 0
if used >= (tonumber(tenant.quota.max_users) or 0) then
  return {'quota_exceeded'}
end
tenant.usage.users = used + 1
tenant.updated_at = ARGV[4]
redis.call('SET', KEYS[3], cjson.encode(tenant))
redis.call('SET', KEYS[1], ARGV[3])
redis.call('HSET', KEYS[2], ARGV[2], ARGV[1])
redis.call('SADD', KEYS[4], ARGV[1])
return {'ok'}
"#;

// KEYS: user, subject index, tenant, tenant users
// ARGV: user id, subject, updated_at
const DELETE_USER: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {'not_found'}
end
redis.call('DEL', KEYS[1])
if redis.call('HGET', KEYS[2], ARGV[2]) == ARGV[1] then
  redis.call('HDEL', KEYS[2], ARGV[2])
end
redis.call('SREM', KEYS[4], ARGV[1])
local raw = redis.call('GET', KEYS[3])
if raw then
  local tenant = cjson.decode(raw)
  local used = tonumber(tenant.usage.users) or 0
  if used > 0 then
    tenant.usage.users = used - 1
    tenant.updated_at = ARGV[3]
    redis.call('SET', KEYS[3], cjson.encode(tenant))
  end
end
return {'ok'}
"#;

// KEYS: role, name index, all roles, scope set, [tenant]
// ARGV: role id, scope key, role json
const CREATE_ROLE: &str = r#"
if KEYS[5] and redis.call('EXISTS', KEYS[5]) == 0 then
  return {'tenant_not_found'}
end
if redis.call('EXISTS', KEYS[1]) == 1 then
  return {'role_exists'}
end
if redis.call('HEXISTS', KEYS[2], ARGV[2]) == 1 then
  return {'name_exists'}
end
redis.call('SET', KEYS[1], ARGV[3])
redis.call('HSET', KEYS[2], ARGV[2], ARGV[1])
redis.call('SADD', KEYS[3], ARGV[1])
redis.call('SADD', KEYS[4], ARGV[1])
return {'ok'}
"#;

// KEYS: role, name index, all roles, scope set
// ARGV: role id, scope key
const DELETE_ROLE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {'not_found'}
end
redis.call('DEL', KEYS[1])
if redis.call('HGET', KEYS[2], ARGV[2]) == ARGV[1] then
  redis.call('HDEL', KEYS[2], ARGV[2])
end
redis.call('SREM', KEYS[3], ARGV[1])
redis.call('SREM', KEYS[4], ARGV[1])
return {'ok'}
"#;

const COMPARE_AND_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return {'not_found'}
end
if current ~= ARGV[1] then
  return {'changed'}
end
redis.call('SET', KEYS[1], ARGV[2])
return {'ok'}
"#;

struct Scripts {
    create_tenant: Script,
    delete_tenant: Script,
    adjust_usage: Script,
    create_user: Script,
    delete_user: Script,
    create_role: Script,
    delete_role: Script,
    compare_and_set: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            create_tenant: Script::new(CREATE_TENANT),
            delete_tenant: Script::new(DELETE_TENANT),
            adjust_usage: Script::new(ADJUST_USAGE),
            create_user: Script::new(CREATE_USER),
            delete_user: Script::new(DELETE_USER),
            create_role: Script::new(CREATE_ROLE),
            delete_role: Script::new(DELETE_ROLE),
            compare_and_set: Script::new(COMPARE_AND_SET),
        }
    }
}

#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    fn tenant(&self, id: &str) -> String {
        format!("{}:tenant:{id}", self.prefix)
    }

    fn tenants(&self) -> String {
        format!("{}:tenants", self.prefix)
    }

    fn tenant_users(&self, id: &str) -> String {
        format!("{}:tenant:{id}:users", self.prefix)
    }

    fn tenant_roles(&self, id: &str) -> String {
        format!("{}:tenant:{id}:roles", self.prefix)
    }

    fn user(&self, id: &str) -> String {
        format!("{}:user:{id}", self.prefix)
    }

    fn subjects(&self) -> String {
        format!("{}:users:subject", self.prefix)
    }

    fn role(&self, id: &str) -> String {
        format!("{}:role:{id}", self.prefix)
    }

    fn roles(&self) -> String {
        format!("{}:roles", self.prefix)
    }

    fn global_roles(&self) -> String {
        format!("{}:roles:global", self.prefix)
    }

    fn role_names(&self) -> String {
        format!("{}:roles:names", self.prefix)
    }

    /// Set holding the ids of roles in the same scope as `tenant_id`.
    fn role_scope(&self, tenant_id: Option<&str>) -> String {
        match tenant_id {
            Some(tenant_id) => self.tenant_roles(tenant_id),
            None => self.global_roles(),
        }
    }

    fn audit_event(&self, id: &str) -> String {
        format!("{}:audit:event:{id}", self.prefix)
    }

    fn audit_index(&self) -> String {
        format!("{}:audit:index", self.prefix)
    }

    fn audit_tenant(&self, id: &str) -> String {
        format!("{}:audit:tenant:{id}", self.prefix)
    }

    fn audit_user(&self, id: &str) -> String {
        format!("{}:audit:user:{id}", self.prefix)
    }

    fn audit_type(&self, event_type: AuditEventType) -> String {
        format!("{}:audit:type:{event_type}", self.prefix)
    }

    /// Every index an event belongs to.
    fn audit_indices(&self, event: &AuditEvent) -> Vec<String> {
        let mut indices = vec![self.audit_index(), self.audit_type(event.event_type)];
        if let Some(tenant_id) = &event.tenant_id {
            indices.push(self.audit_tenant(tenant_id));
        }
        if let Some(user_id) = &event.user_id {
            indices.push(self.audit_user(user_id));
        }
        indices
    }
}

/// First element of a script reply plus its optional payload.
#[derive(Debug, PartialEq, Eq)]
struct ScriptReply {
    status: String,
    payload: Option<String>,
}

impl ScriptReply {
    fn from_parts(parts: Vec<String>) -> StoreResult<Self> {
        let mut parts = parts.into_iter();
        let status = parts
            .next()
            .ok_or_else(|| StoreError::Unexpected(anyhow!("empty script reply")))?;
        Ok(Self {
            status,
            payload: parts.next(),
        })
    }

    fn unexpected(&self, op: &str) -> StoreError {
        StoreError::Unexpected(anyhow!("{op}: unexpected script status {:?}", self.status))
    }
}

fn redis_error(op: &'static str) -> impl FnOnce(RedisError) -> StoreError {
    move |err| {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            StoreError::Unavailable(format!("redis {op}: {err}"))
        } else {
            StoreError::Unexpected(anyhow!("redis {op}: {err}"))
        }
    }
}

fn encode<T: Serialize>(value: &T, what: &str) -> StoreResult<String> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::Unexpected(anyhow!("encode {what}: {err}")))
}

fn decode<T: DeserializeOwned>(raw: &str, what: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|err| StoreError::Unexpected(anyhow!("decode {what}: {err}")))
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Redis-backed identity store.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    keys: Keys,
    scripts: Arc<Scripts>,
    config: StoreConfig,
    observer: Arc<dyn Observer>,
}

impl RedisStore {
    pub async fn connect(
        redis: &RedisConfig,
        config: StoreConfig,
        observer: Arc<dyn Observer>,
    ) -> StoreResult<Self> {
        let client = ::redis::Client::open(redis.url.as_str())
            .map_err(|err| StoreError::Unavailable(format!("redis client: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| StoreError::Unavailable(format!("redis connect: {err}")))?;
        tracing::info!(prefix = %redis.key_prefix, "connected to redis");
        Ok(Self {
            manager,
            keys: Keys {
                prefix: redis.key_prefix.clone(),
            },
            scripts: Arc::new(Scripts::load()),
            config,
            observer,
        })
    }

    async fn run(
        &self,
        op: &'static str,
        invocation: &ScriptInvocation<'_>,
    ) -> StoreResult<ScriptReply> {
        let mut conn = self.manager.clone();
        let parts: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error(op))?;
        ScriptReply::from_parts(parts)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str, what: &str) -> StoreResult<Option<T>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(key).await.map_err(redis_error("get"))?;
        raw.map(|raw| decode(&raw, what)).transpose()
    }

    /// Fetch many records; missing keys are skipped and undecodable ones are
    /// skipped with a warning.
    async fn get_many<T: DeserializeOwned>(&self, keys: Vec<String>, what: &str) -> StoreResult<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let values: Vec<Option<String>> = ::redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_error("mget"))?;
        let mut records = Vec::with_capacity(values.len());
        for (key, raw) in keys.iter().zip(values) {
            let Some(raw) = raw else {
                continue;
            };
            match decode(&raw, what) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(%key, error = %err, "skipping undecodable record"),
            }
        }
        Ok(records)
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut ids: Vec<String> = conn.smembers(key).await.map_err(redis_error("smembers"))?;
        ids.sort();
        Ok(ids)
    }

    /// Read-modify-write through the compare-and-set script.
    async fn update_record<T, F>(&self, key: &str, what: &str, mut mutate: F) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T),
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut conn = self.manager.clone();
            let raw: Option<String> = conn.get(key).await.map_err(redis_error("get"))?;
            let raw = raw.ok_or_else(|| StoreError::NotFound(what.to_string()))?;
            let mut record: T = decode(&raw, what)?;
            mutate(&mut record);
            let replacement = encode(&record, what)?;

            let mut invocation = self.scripts.compare_and_set.prepare_invoke();
            invocation.key(key).arg(&raw).arg(&replacement);
            let reply = self.run("compare_and_set", &invocation).await?;
            match reply.status.as_str() {
                "ok" => return Ok(record),
                "not_found" => return Err(StoreError::NotFound(what.to_string())),
                "changed" => continue,
                _ => return Err(reply.unexpected("compare_and_set")),
            }
        }
        Err(StoreError::Conflict(format!("{what} changed concurrently")))
    }

    async fn adjust_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
        delta: &str,
    ) -> StoreResult<TenantUsage> {
        validate_identifier("tenant", tenant_id)?;
        let mut invocation = self.scripts.adjust_usage.prepare_invoke();
        invocation
            .key(self.keys.tenant(tenant_id))
            .arg(class.as_str())
            .arg(delta)
            .arg(timestamp(Utc::now()));
        let reply = self.run("adjust_usage", &invocation).await?;
        match (reply.status.as_str(), reply.payload.as_deref()) {
            ("ok", Some(usage)) => decode(usage, "tenant usage"),
            ("not_found", _) => Err(StoreError::NotFound(format!("tenant {tenant_id}"))),
            ("inactive", _) => Err(StoreError::TenantInactive(tenant_id.to_string())),
            ("quota_exceeded", _) => Err(StoreError::QuotaExceeded {
                tenant_id: tenant_id.to_string(),
                class,
            }),
            _ => Err(reply.unexpected("adjust_usage")),
        }
    }

    async fn insert_role(&self, role: &Role) -> StoreResult<ScriptReply> {
        let payload = encode(role, "role")?;
        let mut invocation = self.scripts.create_role.prepare_invoke();
        invocation
            .key(self.keys.role(&role.id))
            .key(self.keys.role_names())
            .key(self.keys.roles())
            .key(self.keys.role_scope(role.tenant_id.as_deref()));
        if let Some(tenant_id) = &role.tenant_id {
            invocation.key(self.keys.tenant(tenant_id));
        }
        invocation.arg(&role.id).arg(role.scope_key()).arg(payload);
        self.run("create_role", &invocation).await
    }

    async fn list_events_in(&self, index: String, options: ListOptions) -> StoreResult<Vec<AuditEvent>> {
        let cutoff = self.config.audit_cutoff(Utc::now()).timestamp_millis();
        let mut conn = self.manager.clone();
        let ids: Vec<String> = ::redis::cmd("ZREVRANGEBYSCORE")
            .arg(&index)
            .arg("+inf")
            .arg(cutoff)
            .arg("LIMIT")
            .arg(options.offset)
            .arg(options.effective_limit())
            .query_async(&mut conn)
            .await
            .map_err(redis_error("zrevrangebyscore"))?;
        let keys = ids.iter().map(|id| self.keys.audit_event(id)).collect();
        self.get_many(keys, "audit event").await
    }
}

#[async_trait]
impl IdentityStore for RedisStore {
    async fn create_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        observed(self.observer.as_ref(), "create_tenant", async {
            validate_identifier("tenant", &tenant.id)?;
            let payload = encode(&tenant, "tenant")?;
            let mut invocation = self.scripts.create_tenant.prepare_invoke();
            invocation
                .key(self.keys.tenant(&tenant.id))
                .key(self.keys.tenants())
                .arg(&tenant.id)
                .arg(payload);
            let reply = self.run("create_tenant", &invocation).await?;
            match reply.status.as_str() {
                "ok" => Ok(tenant),
                "exists" => Err(StoreError::AlreadyExists(format!("tenant {}", tenant.id))),
                _ => Err(reply.unexpected("create_tenant")),
            }
        })
        .await
    }

    async fn get_tenant(&self, tenant_id: &str) -> StoreResult<Tenant> {
        observed(self.observer.as_ref(), "get_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            self.get_json(&self.keys.tenant(tenant_id), "tenant")
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))
        })
        .await
    }

    async fn update_tenant(&self, tenant_id: &str, update: TenantUpdate) -> StoreResult<Tenant> {
        observed(self.observer.as_ref(), "update_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            self.update_record(
                &self.keys.tenant(tenant_id),
                &format!("tenant {tenant_id}"),
                |tenant: &mut Tenant| tenant.apply(update.clone(), Utc::now()),
            )
            .await
        })
        .await
    }

    async fn delete_tenant(&self, tenant_id: &str) -> StoreResult<()> {
        observed(self.observer.as_ref(), "delete_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            let mut invocation = self.scripts.delete_tenant.prepare_invoke();
            invocation
                .key(self.keys.tenant(tenant_id))
                .key(self.keys.tenants())
                .key(self.keys.tenant_users(tenant_id))
                .key(self.keys.tenant_roles(tenant_id))
                .key(self.keys.role_names())
                .key(self.keys.roles())
                .arg(tenant_id)
                .arg(self.keys.role(""));
            let reply = self.run("delete_tenant", &invocation).await?;
            match reply.status.as_str() {
                "ok" => Ok(()),
                "not_found" => Err(StoreError::NotFound(format!("tenant {tenant_id}"))),
                "has_users" => Err(StoreError::Conflict(format!(
                    "tenant {tenant_id} still has users"
                ))),
                _ => Err(reply.unexpected("delete_tenant")),
            }
        })
        .await
    }

    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        observed(self.observer.as_ref(), "list_tenants", async {
            let ids = self.members(&self.keys.tenants()).await?;
            let keys = ids.iter().map(|id| self.keys.tenant(id)).collect();
            self.get_many(keys, "tenant").await
        })
        .await
    }

    async fn increment_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage> {
        observed(
            self.observer.as_ref(),
            "increment_usage",
            self.adjust_usage(tenant_id, class, "1"),
        )
        .await
    }

    async fn decrement_usage(
        &self,
        tenant_id: &str,
        class: ResourceClass,
    ) -> StoreResult<TenantUsage> {
        observed(
            self.observer.as_ref(),
            "decrement_usage",
            self.adjust_usage(tenant_id, class, "-1"),
        )
        .await
    }

    async fn create_user(&self, user: TenantUser) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "create_user", async {
            validate_identifier("user", &user.id)?;
            validate_identifier("tenant", &user.tenant_id)?;
            validate_subject(&user.subject)?;
            let payload = encode(&user, "user")?;
            let mut invocation = self.scripts.create_user.prepare_invoke();
            invocation
                .key(self.keys.user(&user.id))
                .key(self.keys.subjects())
                .key(self.keys.tenant(&user.tenant_id))
                .key(self.keys.tenant_users(&user.tenant_id))
                .arg(&user.id)
                .arg(&user.subject)
                .arg(payload)
                .arg(timestamp(Utc::now()));
            let reply = self.run("create_user", &invocation).await?;
            match reply.status.as_str() {
                "ok" => Ok(user),
                "tenant_not_found" => {
                    Err(StoreError::NotFound(format!("tenant {}", user.tenant_id)))
                }
                "user_exists" => Err(StoreError::AlreadyExists(format!("user {}", user.id))),
                "subject_exists" => Err(StoreError::AlreadyExists(format!(
                    "subject {}",
                    user.subject
                ))),
                "inactive" => Err(StoreError::TenantInactive(user.tenant_id.clone())),
                "quota_exceeded" => Err(StoreError::QuotaExceeded {
                    tenant_id: user.tenant_id.clone(),
                    class: ResourceClass::Users,
                }),
                _ => Err(reply.unexpected("create_user")),
            }
        })
        .await
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "get_user", async {
            validate_identifier("user", user_id)?;
            self.get_json(&self.keys.user(user_id), "user")
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
        })
        .await
    }

    async fn get_user_by_subject(&self, subject: &str) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "get_user_by_subject", async {
            let mut conn = self.manager.clone();
            let user_id: Option<String> = conn
                .hget(self.keys.subjects(), subject)
                .await
                .map_err(redis_error("hget"))?;
            let not_found = || StoreError::NotFound("user for subject".to_string());
            let user_id = user_id.ok_or_else(not_found)?;
            self.get_json(&self.keys.user(&user_id), "user")
                .await?
                .ok_or_else(not_found)
        })
        .await
    }

    async fn update_user(&self, user_id: &str, update: UserUpdate) -> StoreResult<TenantUser> {
        observed(self.observer.as_ref(), "update_user", async {
            validate_identifier("user", user_id)?;
            self.update_record(
                &self.keys.user(user_id),
                &format!("user {user_id}"),
                |user: &mut TenantUser| user.apply(update.clone(), Utc::now()),
            )
            .await
        })
        .await
    }

    async fn update_last_login(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        observed(self.observer.as_ref(), "update_last_login", async {
            validate_identifier("user", user_id)?;
            self.update_record(
                &self.keys.user(user_id),
                &format!("user {user_id}"),
                |user: &mut TenantUser| user.last_login_at = Some(at),
            )
            .await
            .map(|_: TenantUser| ())
        })
        .await
    }

    async fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        observed(self.observer.as_ref(), "delete_user", async {
            validate_identifier("user", user_id)?;
            let user: TenantUser = self
                .get_json(&self.keys.user(user_id), "user")
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
            let mut invocation = self.scripts.delete_user.prepare_invoke();
            invocation
                .key(self.keys.user(user_id))
                .key(self.keys.subjects())
                .key(self.keys.tenant(&user.tenant_id))
                .key(self.keys.tenant_users(&user.tenant_id))
                .arg(user_id)
                .arg(&user.subject)
                .arg(timestamp(Utc::now()));
            let reply = self.run("delete_user", &invocation).await?;
            match reply.status.as_str() {
                "ok" => Ok(()),
                "not_found" => Err(StoreError::NotFound(format!("user {user_id}"))),
                _ => Err(reply.unexpected("delete_user")),
            }
        })
        .await
    }

    async fn list_users_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<TenantUser>> {
        observed(self.observer.as_ref(), "list_users_by_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            let ids = self.members(&self.keys.tenant_users(tenant_id)).await?;
            let keys = ids.iter().map(|id| self.keys.user(id)).collect();
            self.get_many(keys, "user").await
        })
        .await
    }

    async fn create_role(&self, role: Role) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "create_role", async {
            validate_identifier("role", &role.id)?;
            if let Some(tenant_id) = &role.tenant_id {
                validate_identifier("tenant", tenant_id)?;
            }
            let reply = self.insert_role(&role).await?;
            match reply.status.as_str() {
                "ok" => Ok(role),
                "tenant_not_found" => Err(StoreError::NotFound(format!(
                    "tenant {}",
                    role.tenant_id.as_deref().unwrap_or_default()
                ))),
                "role_exists" => Err(StoreError::AlreadyExists(format!("role {}", role.id))),
                "name_exists" => {
                    Err(StoreError::AlreadyExists(format!("role name {}", role.name)))
                }
                _ => Err(reply.unexpected("create_role")),
            }
        })
        .await
    }

    async fn get_role(&self, role_id: &str) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "get_role", async {
            validate_identifier("role", role_id)?;
            self.get_json(&self.keys.role(role_id), "role")
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))
        })
        .await
    }

    async fn get_role_by_name(&self, tenant_id: Option<&str>, name: &str) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "get_role_by_name", async {
            let mut conn = self.manager.clone();
            let role_id: Option<String> = conn
                .hget(self.keys.role_names(), Role::scope_key_for(tenant_id, name))
                .await
                .map_err(redis_error("hget"))?;
            let not_found = || StoreError::NotFound(format!("role {name}"));
            let role_id = role_id.ok_or_else(not_found)?;
            self.get_json(&self.keys.role(&role_id), "role")
                .await?
                .ok_or_else(not_found)
        })
        .await
    }

    async fn update_role(&self, role_id: &str, update: RoleUpdate) -> StoreResult<Role> {
        observed(self.observer.as_ref(), "update_role", async {
            validate_identifier("role", role_id)?;
            self.update_record(
                &self.keys.role(role_id),
                &format!("role {role_id}"),
                |role: &mut Role| apply_role_update(role, update.clone(), Utc::now()),
            )
            .await
        })
        .await
    }

    async fn delete_role(&self, role_id: &str) -> StoreResult<()> {
        observed(self.observer.as_ref(), "delete_role", async {
            validate_identifier("role", role_id)?;
            let role: Role = self
                .get_json(&self.keys.role(role_id), "role")
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
            let mut invocation = self.scripts.delete_role.prepare_invoke();
            invocation
                .key(self.keys.role(role_id))
                .key(self.keys.role_names())
                .key(self.keys.roles())
                .key(self.keys.role_scope(role.tenant_id.as_deref()))
                .arg(role_id)
                .arg(role.scope_key());
            let reply = self.run("delete_role", &invocation).await?;
            match reply.status.as_str() {
                "ok" => Ok(()),
                "not_found" => Err(StoreError::NotFound(format!("role {role_id}"))),
                _ => Err(reply.unexpected("delete_role")),
            }
        })
        .await
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        observed(self.observer.as_ref(), "list_roles", async {
            let ids = self.members(&self.keys.roles()).await?;
            let keys = ids.iter().map(|id| self.keys.role(id)).collect();
            self.get_many(keys, "role").await
        })
        .await
    }

    async fn list_roles_by_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Role>> {
        observed(self.observer.as_ref(), "list_roles_by_tenant", async {
            validate_identifier("tenant", tenant_id)?;
            let mut conn = self.manager.clone();
            let mut ids: Vec<String> = ::redis::cmd("SUNION")
                .arg(self.keys.global_roles())
                .arg(self.keys.tenant_roles(tenant_id))
                .query_async(&mut conn)
                .await
                .map_err(redis_error("sunion"))?;
            ids.sort();
            let keys = ids.iter().map(|id| self.keys.role(id)).collect();
            self.get_many(keys, "role").await
        })
        .await
    }

    async fn initialize_default_roles(&self) -> StoreResult<()> {
        observed(self.observer.as_ref(), "initialize_default_roles", async {
            for role in predefined::default_roles(Utc::now()) {
                let reply = self.insert_role(&role).await?;
                match reply.status.as_str() {
                    "ok" => tracing::info!(role = %role.name, "seeded predefined role"),
                    "role_exists" | "name_exists" => {}
                    _ => return Err(reply.unexpected("initialize_default_roles")),
                }
            }
            Ok(())
        })
        .await
    }

    async fn log_event(&self, event: AuditEvent) -> StoreResult<()> {
        observed(self.observer.as_ref(), "log_event", async {
            let payload = encode(&event, "audit event")?;
            let cutoff = self.config.audit_cutoff(Utc::now()).timestamp_millis();
            let ttl_ms = u64::try_from(self.config.audit_retention.as_millis()).unwrap_or(u64::MAX);
            let score = event.timestamp.timestamp_millis();

            let mut pipe = ::redis::pipe();
            pipe.atomic();
            pipe.cmd("SET")
                .arg(self.keys.audit_event(&event.id))
                .arg(payload)
                .arg("PX")
                .arg(ttl_ms)
                .ignore();
            for index in self.keys.audit_indices(&event) {
                pipe.cmd("ZADD").arg(&index).arg(score).arg(&event.id).ignore();
                pipe.cmd("ZREMRANGEBYSCORE")
                    .arg(&index)
                    .arg("-inf")
                    .arg(format!("({cutoff}"))
                    .ignore();
            }
            let mut conn = self.manager.clone();
            pipe.query_async::<_, ()>(&mut conn)
                .await
                .map_err(redis_error("log_event"))
        })
        .await
    }

    async fn list_events(&self, options: ListOptions) -> StoreResult<Vec<AuditEvent>> {
        observed(
            self.observer.as_ref(),
            "list_events",
            self.list_events_in(self.keys.audit_index(), options),
        )
        .await
    }

    async fn list_events_by_tenant(
        &self,
        tenant_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        observed(
            self.observer.as_ref(),
            "list_events_by_tenant",
            self.list_events_in(self.keys.audit_tenant(tenant_id), options),
        )
        .await
    }

    async fn list_events_by_type(
        &self,
        event_type: AuditEventType,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        observed(
            self.observer.as_ref(),
            "list_events_by_type",
            self.list_events_in(self.keys.audit_type(event_type), options),
        )
        .await
    }

    async fn list_events_by_user(
        &self,
        user_id: &str,
        options: ListOptions,
    ) -> StoreResult<Vec<AuditEvent>> {
        observed(
            self.observer.as_ref(),
            "list_events_by_user",
            self.list_events_in(self.keys.audit_user(user_id), options),
        )
        .await
    }

    async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_error("ping"))?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
