use anyhow::{Context, Result, bail};
use gatekeeper_authz::SkipPathMatcher;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_SKIP_PATHS: [&str; 3] = ["/healthz", "/readyz", "/metrics"];
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Which `IdentityStore` backend the service runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Redis,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            other => bail!("unknown storage backend {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
}

/// Settings consumed by the authentication pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub enabled: bool,
    pub require_mtls: bool,
    pub skip_paths: Vec<String>,
    /// Read `X-Forwarded-Client-Cert`, `X-SSL-Client-DN` and
    /// `X-Forwarded-For`. Only enable behind a proxy that strips them.
    pub trust_proxy_headers: bool,
    pub storage_timeout: Duration,
    pub last_login_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_mtls: true,
            skip_paths: DEFAULT_SKIP_PATHS.iter().map(|p| p.to_string()).collect(),
            trust_proxy_headers: true,
            storage_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            last_login_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl AuthConfig {
    fn skip_matcher(&self) -> Result<SkipPathMatcher> {
        SkipPathMatcher::new(&self.skip_paths).with_context(|| "compile skip paths")
    }
}

// Gateway configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub redis: Option<RedisConfig>,
    pub audit_retention: Duration,
    pub auth: AuthConfig,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    redis_url: Option<String>,
    redis_prefix: Option<String>,
    audit_retention_days: Option<u64>,
    auth: Option<AuthConfigOverride>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthConfigOverride {
    enabled: Option<bool>,
    require_mtls: Option<bool>,
    skip_paths: Option<Vec<String>>,
    trust_proxy_headers: Option<bool>,
    storage_timeout_ms: Option<u64>,
    last_login_timeout_ms: Option<u64>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("parse {name}: expected a boolean, got {other:?}"),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    env_var(name).map_or(Ok(default), |value| parse_bool(name, &value))
}

fn env_millis(name: &str, default: u64) -> Result<Duration> {
    let millis = match env_var(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("parse {name}"))?,
        None => default,
    };
    positive_millis(name, millis)
}

fn positive_millis(name: &str, millis: u64) -> Result<Duration> {
    if millis == 0 {
        bail!("{name} must be greater than zero");
    }
    Ok(Duration::from_millis(millis))
}

fn retention_days(name: &str, days: u64) -> Result<Duration> {
    if days == 0 {
        bail!("{name} must be greater than zero");
    }
    let retention = days
        .checked_mul(SECONDS_PER_DAY)
        .map(Duration::from_secs)
        .with_context(|| format!("{name} is too large"))?;
    // Cutoffs and TTLs are computed with chrono millisecond arithmetic.
    chrono::Duration::from_std(retention).with_context(|| format!("{name} is too large"))?;
    Ok(retention)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_var("GATEKEEPER_BIND")
            .unwrap_or_else(|| "0.0.0.0:8443".to_string())
            .parse()
            .with_context(|| "parse GATEKEEPER_BIND")?;
        let metrics_bind = env_var("GATEKEEPER_METRICS_BIND")
            .unwrap_or_else(|| "0.0.0.0:9090".to_string())
            .parse()
            .with_context(|| "parse GATEKEEPER_METRICS_BIND")?;
        let storage = match env_var("GATEKEEPER_STORAGE") {
            Some(value) => value.parse().with_context(|| "parse GATEKEEPER_STORAGE")?,
            None => StorageBackend::Memory,
        };
        let redis = env_var("GATEKEEPER_REDIS_URL").map(|url| RedisConfig {
            url,
            key_prefix: env_var("GATEKEEPER_REDIS_PREFIX")
                .unwrap_or_else(|| "gatekeeper".to_string()),
        });
        let audit_retention = match env_var("GATEKEEPER_AUDIT_RETENTION_DAYS") {
            Some(value) => retention_days(
                "GATEKEEPER_AUDIT_RETENTION_DAYS",
                value
                    .trim()
                    .parse()
                    .with_context(|| "parse GATEKEEPER_AUDIT_RETENTION_DAYS")?,
            )?,
            None => retention_days("GATEKEEPER_AUDIT_RETENTION_DAYS", 30)?,
        };
        let auth = AuthConfig {
            enabled: env_bool("GATEKEEPER_AUTH_ENABLED", true)?,
            require_mtls: env_bool("GATEKEEPER_REQUIRE_MTLS", true)?,
            skip_paths: env_var("GATEKEEPER_SKIP_PATHS")
                .map(|value| split_list(&value))
                .unwrap_or_else(|| AuthConfig::default().skip_paths),
            trust_proxy_headers: env_bool("GATEKEEPER_TRUST_PROXY_HEADERS", true)?,
            storage_timeout: env_millis("GATEKEEPER_STORAGE_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            last_login_timeout: env_millis(
                "GATEKEEPER_LAST_LOGIN_TIMEOUT_MS",
                DEFAULT_TIMEOUT_MS,
            )?,
        };
        let config = Self {
            bind_addr,
            metrics_bind,
            storage,
            redis,
            audit_retention,
            auth,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Some(path) = env_var("GATEKEEPER_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read GATEKEEPER_CONFIG: {path}"))?;
            let override_cfg: GatewayConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse gatekeeper config yaml")?;
            config.apply_override(override_cfg)?;
            config.validate()?;
        }
        Ok(config)
    }

    fn apply_override(&mut self, override_cfg: GatewayConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(url) = override_cfg.redis_url {
            let key_prefix = self
                .redis
                .as_ref()
                .map(|redis| redis.key_prefix.clone())
                .unwrap_or_else(|| "gatekeeper".to_string());
            self.redis = Some(RedisConfig { url, key_prefix });
        }
        if let Some(prefix) = override_cfg.redis_prefix {
            match self.redis.as_mut() {
                Some(redis) => redis.key_prefix = prefix,
                None => bail!("redis_prefix set without redis_url"),
            }
        }
        if let Some(days) = override_cfg.audit_retention_days {
            self.audit_retention = retention_days("audit_retention_days", days)?;
        }
        if let Some(auth) = override_cfg.auth {
            if let Some(value) = auth.enabled {
                self.auth.enabled = value;
            }
            if let Some(value) = auth.require_mtls {
                self.auth.require_mtls = value;
            }
            if let Some(value) = auth.skip_paths {
                self.auth.skip_paths = value;
            }
            if let Some(value) = auth.trust_proxy_headers {
                self.auth.trust_proxy_headers = value;
            }
            if let Some(value) = auth.storage_timeout_ms {
                self.auth.storage_timeout = positive_millis("auth.storage_timeout_ms", value)?;
            }
            if let Some(value) = auth.last_login_timeout_ms {
                self.auth.last_login_timeout =
                    positive_millis("auth.last_login_timeout_ms", value)?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Redis && self.redis.is_none() {
            bail!("GATEKEEPER_REDIS_URL is required when GATEKEEPER_STORAGE=redis");
        }
        self.auth.skip_matcher()?;
        Ok(())
    }
}
