//! Declarative configuration.
//!
//! Sources, lowest to highest priority:
//!
//! 1. Built-in defaults ([`PipelineConfig::default`])
//! 2. `crosscut.toml` in the working directory, if present
//! 3. Environment variables prefixed `CROSSCUT_`, with `__` separating
//!    nested keys: `CROSSCUT_AUTH__SECRET=...` sets `auth.secret`.
//!
//! Rule lists (`filters`, `interceptors`, `aspects`) carry patterns and
//! ordering only. They bind to code by name through
//! [`FilterRegistration::from_rule`](crate::filter::FilterRegistration::from_rule),
//! [`InterceptorRegistration::from_rule`](crate::interceptor::InterceptorRegistration::from_rule)
//! and [`Aspect::from_rule`](crate::weave::Aspect::from_rule).
//!
//! ```toml
//! [auth]
//! secret = "change-me"
//! ttl_secs = 600
//!
//! [[filters]]
//! name = "log"
//! url_patterns = ["/**"]
//! order = 1
//!
//! [[interceptors]]
//! name = "auth"
//! include = ["/user/**"]
//! exclude = ["/user/login", "/user/error"]
//!
//! [[aspects]]
//! name = "sys_log"
//! marker = "sys_log"
//! ```

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheSettings, TtlPolicy};
use crate::matching::{CallRule, PatternError};
use crate::order::DEFAULT_ORDER;

const CONFIG_FILE: &str = "crosscut.toml";
const ENV_PREFIX: &str = "CROSSCUT_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub filters: Vec<FilterRule>,
    pub interceptors: Vec<InterceptorRule>,
    pub aspects: Vec<AspectRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { directive: "info".to_owned() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key. Empty by default; the authenticator refuses to start without one.
    pub secret: String,
    pub ttl_secs: u64,
    /// Header the token guard reads.
    pub header: String,
    /// Claims every verified token must carry besides the expiry.
    pub required_claims: Vec<String>,
}

impl AuthConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_secs: 600,
            header: "authorization".to_owned(),
            required_claims: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryKind {
    ExpireAfterAccess,
    ExpireAfterWrite,
    Never,
}

/// Defaults for caches created through the [`CacheManager`](crate::cache::CacheManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub policy: ExpiryKind,
    pub ttl_secs: u64,
    pub max_capacity: Option<usize>,
    pub initial_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: ExpiryKind::ExpireAfterAccess,
            ttl_secs: 3600,
            max_capacity: Some(1000),
            initial_capacity: 100,
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        let ttl = Duration::from_secs(self.ttl_secs);
        CacheSettings {
            ttl: match self.policy {
                ExpiryKind::ExpireAfterAccess => TtlPolicy::AfterAccess(ttl),
                ExpiryKind::ExpireAfterWrite => TtlPolicy::AfterWrite(ttl),
                ExpiryKind::Never => TtlPolicy::Never,
            },
            max_capacity: self.max_capacity,
            initial_capacity: self.initial_capacity,
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    pub name: String,
    /// Empty means every path.
    #[serde(default)]
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_order")]
    pub order: i32,
    #[serde(default)]
    pub init_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorRule {
    pub name: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_order")]
    pub order: i32,
}

/// Exactly one of `marker` and `signature` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectRule {
    pub name: String,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default = "default_order")]
    pub order: i32,
}

impl AspectRule {
    pub fn pointcut(&self) -> Result<CallRule, ConfigError> {
        match (&self.marker, &self.signature) {
            (Some(marker), None) => Ok(CallRule::marker(marker.as_str())),
            (None, Some(signature)) => Ok(CallRule::signature(signature)?),
            _ => Err(ConfigError::invalid(format!(
                "aspect `{}` needs exactly one of `marker` or `signature`",
                self.name
            ))),
        }
    }
}

fn default_order() -> i32 {
    DEFAULT_ORDER
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PipelineConfig {
    /// Defaults, then `crosscut.toml`, then `CROSSCUT_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        debug!(
            file = %path.display(),
            filters = config.filters.len(),
            interceptors = config.interceptors.len(),
            aspects = config.aspects.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Defaults overlaid with a TOML document. No environment lookup.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?)
    }

    pub fn filter(&self, name: &str) -> Option<&FilterRule> {
        self.filters.iter().find(|r| r.name == name)
    }

    pub fn interceptor(&self, name: &str) -> Option<&InterceptorRule> {
        self.interceptors.iter().find(|r| r.name == name)
    }

    pub fn aspect(&self, name: &str) -> Option<&AspectRule> {
        self.aspects.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::CallSite;

    #[test]
    fn defaults_without_any_source() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config.server.addr.port(), 3000);
        assert_eq!(config.auth.ttl(), Duration::from_secs(600));
        assert_eq!(config.auth.header, "authorization");
        assert_eq!(config.cache.policy, ExpiryKind::ExpireAfterAccess);
        assert_eq!(config.cache.max_capacity, Some(1000));
        assert!(config.filters.is_empty());
    }

    #[test]
    fn rule_lists_keep_file_order() {
        let config = PipelineConfig::from_toml(
            r#"
            [auth]
            secret = "s3cret"

            [[filters]]
            name = "log"
            url_patterns = ["/**"]
            order = 2
            init_params = { mode = "verbose" }

            [[filters]]
            name = "trace"
            order = 1

            [[interceptors]]
            name = "auth"
            include = ["/user/**"]
            exclude = ["/user/login"]
            "#,
        )
        .unwrap();

        let names: Vec<_> = config.filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["log", "trace"]);
        assert_eq!(config.filter("log").unwrap().init_params["mode"], "verbose");
        assert!(config.filter("trace").unwrap().url_patterns.is_empty());
        assert_eq!(config.interceptor("auth").unwrap().order, DEFAULT_ORDER);
        assert_eq!(config.auth.secret, "s3cret");
    }

    #[test]
    fn aspect_needs_exactly_one_pointcut() {
        let marker = AspectRule {
            name: "sys_log".into(),
            marker: Some("sys_log".into()),
            signature: None,
            order: 0,
        };
        let site = CallSite::new("demo::UserService", "save")
            .marked(crate::matching::Marker::new("sys_log"));
        assert!(marker.pointcut().unwrap().matches(&site));

        let both = AspectRule { signature: Some("demo::*.save".into()), ..marker.clone() };
        assert!(matches!(both.pointcut(), Err(ConfigError::Invalid(_))));

        let neither = AspectRule { marker: None, ..marker };
        assert!(neither.pointcut().is_err());
    }

    #[test]
    fn cache_section_builds_settings() {
        let config = PipelineConfig::from_toml(
            r#"
            [cache]
            policy = "expire_after_write"
            ttl_secs = 5
            "#,
        )
        .unwrap();
        let settings = config.cache.settings();
        assert_eq!(settings.ttl, TtlPolicy::AfterWrite(Duration::from_secs(5)));
        assert_eq!(settings.initial_capacity, 100);
    }
}
