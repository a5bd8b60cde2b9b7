//! Tenancy options and configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use mt_core::{MtConfigSnapshot, DEFAULT_SHARED_CAPACITY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::policy::ScopeKind;

/// Prefix of every tenancy key in the app's key/value config.
pub const CONFIG_PREFIX: &str = "multitenant.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("primary domain cannot be empty with the domain strategy")]
    MissingPrimaryDomain,

    #[error("session strategy requires a session path")]
    MissingSessionPath,

    #[error("tenant model requires a {0}")]
    IncompleteModel(&'static str),

    #[error("shared resolution cache needs a ttl greater than 0")]
    ZeroTtl,

    #[error("shared resolution cache needs a capacity greater than 0")]
    ZeroCapacity,

    #[error("unknown scope policy '{0}'")]
    UnknownPolicy(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// How the tenant qualifier is read from a request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Subdomain of the primary domain.
    Domain,
    /// Dotted path into the session store.
    Session { path: String },
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Domain
    }
}

/// Which collection holds tenant records and how a qualifier selects one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TenantModel {
    /// Service name of the tenant collection.
    pub service: String,
    /// Field compared with the qualifier.
    pub field: String,
    /// Field holding the tenant's identity, referenced by scoped rows.
    pub identity_field: String,
    /// Extra equality conditions a tenant record must satisfy (e.g. active flag).
    pub conditions: Map<String, Value>,
}

impl Default for TenantModel {
    fn default() -> Self {
        Self {
            service: "accounts".to_string(),
            field: "domain".to_string(),
            identity_field: "id".to_string(),
            conditions: Map::new(),
        }
    }
}

/// Application-wide policy defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScopeDefaults {
    pub foreign_key_field: String,
    /// Owner value marking a row as visible to every tenant.
    pub global_value: Value,
}

impl Default for ScopeDefaults {
    fn default() -> Self {
        Self {
            foreign_key_field: "account_id".to_string(),
            global_value: Value::from(0),
        }
    }
}

/// Policy for one collection; unset fields fall back to [`ScopeDefaults`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub kind: ScopeKind,
    #[serde(default)]
    pub foreign_key_field: Option<String>,
    #[serde(default)]
    pub global_value: Option<Value>,
}

impl PolicyConfig {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            foreign_key_field: None,
            global_value: None,
        }
    }

    pub fn foreign_key_field(mut self, field: impl Into<String>) -> Self {
        self.foreign_key_field = Some(field.into());
        self
    }

    pub fn global_value(mut self, value: impl Into<Value>) -> Self {
        self.global_value = Some(value.into());
        self
    }
}

/// Lifetime of resolved tenant identities.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    /// One cache per request, dropped with it.
    Request,
    /// One cache for the process; entries expire after `ttl` and the least
    /// used are evicted beyond `capacity` qualifiers.
    Shared {
        #[serde(with = "humantime_serde")]
        ttl: Duration,
        #[serde(default = "default_cache_capacity")]
        capacity: u64,
    },
}

fn default_cache_capacity() -> u64 {
    DEFAULT_SHARED_CAPACITY
}

impl CachePolicy {
    /// Shared cache with the default capacity.
    pub fn shared(ttl: Duration) -> Self {
        Self::Shared {
            ttl,
            capacity: DEFAULT_SHARED_CAPACITY,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Request
    }
}

/// Main tenancy configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TenancyOptions {
    pub strategy: Strategy,
    /// Domain of the primary site, e.g. `app.test`.
    pub primary_domain: String,
    /// Subdomains that also serve the primary site.
    pub primary_subdomains: Vec<String>,
    /// Where requests for unknown or inactive tenants are sent.
    pub redirect_inactive: String,
    pub model: TenantModel,
    pub scope: ScopeDefaults,
    /// Scope policy per service name.
    pub policies: BTreeMap<String, PolicyConfig>,
    pub cache: CachePolicy,
}

impl Default for TenancyOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            primary_domain: String::new(),
            primary_subdomains: vec!["www".to_string()],
            redirect_inactive: "/".to_string(),
            model: TenantModel::default(),
            scope: ScopeDefaults::default(),
            policies: BTreeMap::new(),
            cache: CachePolicy::default(),
        }
    }
}

impl TenancyOptions {
    /// Create a new TenancyOptions builder
    pub fn builder() -> TenancyOptionsBuilder {
        TenancyOptionsBuilder::new()
    }

    /// Validate the whole tenancy configuration
    pub fn validate(&self) -> Result<(), OptionsError> {
        match &self.strategy {
            Strategy::Domain if self.primary_domain.trim().is_empty() => {
                return Err(OptionsError::MissingPrimaryDomain);
            }
            Strategy::Session { path } if path.trim().is_empty() => {
                return Err(OptionsError::MissingSessionPath);
            }
            _ => {}
        }

        if self.model.service.is_empty() {
            return Err(OptionsError::IncompleteModel("service"));
        }
        if self.model.field.is_empty() {
            return Err(OptionsError::IncompleteModel("field"));
        }
        if self.model.identity_field.is_empty() {
            return Err(OptionsError::IncompleteModel("identity field"));
        }

        if let CachePolicy::Shared { ttl, capacity } = self.cache {
            if ttl.is_zero() {
                return Err(OptionsError::ZeroTtl);
            }
            if capacity == 0 {
                return Err(OptionsError::ZeroCapacity);
            }
        }

        Ok(())
    }

    /// Read options from `multitenant.*` keys, starting from the defaults.
    ///
    /// ```text
    /// multitenant.strategy              = domain | session
    /// multitenant.session_path          = Auth.User.account
    /// multitenant.primary_domain        = app.test
    /// multitenant.primary_subdomains    = www, admin
    /// multitenant.redirect_inactive     = /inactive
    /// multitenant.model.service         = accounts
    /// multitenant.model.field           = domain
    /// multitenant.model.identity_field  = id
    /// multitenant.model.conditions.<f>  = <json or text>
    /// multitenant.scope.foreign_key_field = account_id
    /// multitenant.scope.global_value    = 0
    /// multitenant.policies.<service>    = global_only | tenant_only | mixed | unscoped
    /// multitenant.policies.<service>.foreign_key_field = owner_id
    /// multitenant.policies.<service>.global_value      = 0
    /// multitenant.cache                 = request | shared
    /// multitenant.cache_ttl             = 5m
    /// multitenant.cache_capacity        = 10000
    /// ```
    pub fn from_config(config: &MtConfigSnapshot) -> Result<Self, OptionsError> {
        let key = |k: &str| format!("{CONFIG_PREFIX}{k}");
        let mut options = Self::default();

        options.strategy = match config.get(&key("strategy")).unwrap_or("domain") {
            "domain" => Strategy::Domain,
            "session" => Strategy::Session {
                path: config.get_string(&key("session_path")).unwrap_or_default(),
            },
            other => {
                return Err(OptionsError::InvalidValue {
                    key: key("strategy"),
                    reason: format!("expected 'domain' or 'session', got '{other}'"),
                })
            }
        };

        if let Some(v) = config.get_string(&key("primary_domain")) {
            options.primary_domain = v;
        }
        if let Some(v) = config.get_list(&key("primary_subdomains")) {
            options.primary_subdomains = v;
        }
        if let Some(v) = config.get_string(&key("redirect_inactive")) {
            options.redirect_inactive = v;
        }

        if let Some(v) = config.get_string(&key("model.service")) {
            options.model.service = v;
        }
        if let Some(v) = config.get_string(&key("model.field")) {
            options.model.field = v;
        }
        if let Some(v) = config.get_string(&key("model.identity_field")) {
            options.model.identity_field = v;
        }
        for (field, raw) in config.with_prefix(&key("model.conditions.")) {
            options.model.conditions.insert(field, literal(&raw));
        }

        if let Some(v) = config.get_string(&key("scope.foreign_key_field")) {
            options.scope.foreign_key_field = v;
        }
        if let Some(v) = config.get(&key("scope.global_value")) {
            options.scope.global_value = literal(v);
        }

        for (rest, raw) in config.with_prefix(&key("policies.")) {
            match rest.split_once('.') {
                None => {
                    let kind: ScopeKind = raw.parse()?;
                    options
                        .policies
                        .entry(rest.clone())
                        .and_modify(|p| p.kind = kind)
                        .or_insert_with(|| PolicyConfig::new(kind));
                }
                Some((service, setting)) => {
                    let policy = options.policies.get_mut(service).ok_or_else(|| OptionsError::InvalidValue {
                        key: key(&format!("policies.{rest}")),
                        reason: format!("no policy kind configured for '{service}'"),
                    })?;
                    match setting {
                        "foreign_key_field" => policy.foreign_key_field = Some(raw),
                        "global_value" => policy.global_value = Some(literal(&raw)),
                        other => {
                            return Err(OptionsError::InvalidValue {
                                key: key(&format!("policies.{rest}")),
                                reason: format!("unknown policy setting '{other}'"),
                            })
                        }
                    }
                }
            }
        }

        options.cache = match config.get(&key("cache")).unwrap_or("request") {
            "request" => CachePolicy::Request,
            "shared" => {
                let raw = config.get_string(&key("cache_ttl")).unwrap_or_else(|| "60s".to_string());
                let ttl: Duration = humantime_serde::deserialize(Value::String(raw)).map_err(|e| {
                    OptionsError::InvalidValue {
                        key: key("cache_ttl"),
                        reason: e.to_string(),
                    }
                })?;
                let capacity = match config.get(&key("cache_capacity")) {
                    Some(raw) => raw.trim().parse::<u64>().map_err(|e| OptionsError::InvalidValue {
                        key: key("cache_capacity"),
                        reason: e.to_string(),
                    })?,
                    None => DEFAULT_SHARED_CAPACITY,
                };
                CachePolicy::Shared { ttl, capacity }
            }
            other => {
                return Err(OptionsError::InvalidValue {
                    key: key("cache"),
                    reason: format!("expected 'request' or 'shared', got '{other}'"),
                })
            }
        };

        Ok(options)
    }
}

/// JSON literal when it parses as one (`0`, `true`, `"x"`), plain text otherwise.
fn literal(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Builder pattern for TenancyOptions configuration
#[derive(Clone, Debug, Default)]
pub struct TenancyOptionsBuilder {
    options: TenancyOptions,
}

impl TenancyOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    pub fn primary_domain(mut self, domain: impl Into<String>) -> Self {
        self.options.primary_domain = domain.into();
        self
    }

    pub fn primary_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.primary_subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    pub fn redirect_inactive(mut self, uri: impl Into<String>) -> Self {
        self.options.redirect_inactive = uri.into();
        self
    }

    pub fn model(mut self, model: TenantModel) -> Self {
        self.options.model = model;
        self
    }

    pub fn scope_defaults(mut self, scope: ScopeDefaults) -> Self {
        self.options.scope = scope;
        self
    }

    /// Attach a scope policy to a service.
    pub fn policy(mut self, service: impl Into<String>, policy: PolicyConfig) -> Self {
        self.options.policies.insert(service.into(), policy);
        self
    }

    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.options.cache = cache;
        self
    }

    pub fn build(self) -> TenancyOptions {
        self.options
    }

    /// Build and validate the TenancyOptions configuration
    pub fn build_validated(self) -> Result<TenancyOptions, OptionsError> {
        let options = self.build();
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mt_core::MtConfig;
    use serde_json::json;

    #[test]
    fn domain_strategy_needs_a_primary_domain() {
        assert_eq!(
            TenancyOptions::default().validate(),
            Err(OptionsError::MissingPrimaryDomain)
        );
        assert!(TenancyOptions::builder()
            .primary_domain("app.test")
            .build_validated()
            .is_ok());
    }

    #[test]
    fn shared_cache_rejects_zero_ttl() {
        let err = TenancyOptions::builder()
            .primary_domain("app.test")
            .cache(CachePolicy::shared(Duration::ZERO))
            .build_validated()
            .unwrap_err();
        assert_eq!(err, OptionsError::ZeroTtl);

        let err = TenancyOptions::builder()
            .primary_domain("app.test")
            .cache(CachePolicy::Shared {
                ttl: Duration::from_secs(1),
                capacity: 0,
            })
            .build_validated()
            .unwrap_err();
        assert_eq!(err, OptionsError::ZeroCapacity);
    }

    #[test]
    fn reads_keys_from_app_config() {
        let mut cfg = MtConfig::new();
        cfg.set("multitenant.strategy", "session");
        cfg.set("multitenant.session_path", "Auth.User.account");
        cfg.set("multitenant.primary_subdomains", "www, admin");
        cfg.set("multitenant.redirect_inactive", "/inactive");
        cfg.set("multitenant.model.conditions.is_active", "true");
        cfg.set("multitenant.policies.accounts", "tenant_only");
        cfg.set("multitenant.policies.posts", "mixed");
        cfg.set("multitenant.policies.posts.foreign_key_field", "owner_id");
        cfg.set("multitenant.cache", "shared");
        cfg.set("multitenant.cache_ttl", "5m");
        cfg.set("multitenant.cache_capacity", "500");

        let options = TenancyOptions::from_config(&cfg.snapshot()).unwrap();

        assert_eq!(
            options.strategy,
            Strategy::Session {
                path: "Auth.User.account".to_string()
            }
        );
        assert_eq!(options.primary_subdomains, vec!["www", "admin"]);
        assert_eq!(options.model.conditions.get("is_active"), Some(&json!(true)));
        assert_eq!(options.policies["accounts"].kind, ScopeKind::TenantOnly);
        assert_eq!(options.policies["posts"].foreign_key_field.as_deref(), Some("owner_id"));
        assert_eq!(
            options.cache,
            CachePolicy::Shared {
                ttl: Duration::from_secs(300),
                capacity: 500,
            }
        );
        assert!(options.validate().is_ok());
    }

    #[test]
    fn unknown_policy_kind_is_rejected() {
        let mut cfg = MtConfig::new();
        cfg.set("multitenant.policies.posts", "everything");
        assert_eq!(
            TenancyOptions::from_config(&cfg.snapshot()).unwrap_err(),
            OptionsError::UnknownPolicy("everything".to_string())
        );
    }

    #[test]
    fn deserializes_from_json() {
        let options: TenancyOptions = serde_json::from_value(json!({
            "primary_domain": "app.test",
            "policies": { "notes": { "kind": "tenant_only" } },
            "cache": { "kind": "shared", "ttl": "30s" }
        }))
        .unwrap();

        assert_eq!(options.redirect_inactive, "/");
        assert_eq!(options.policies["notes"].kind, ScopeKind::TenantOnly);
        assert_eq!(options.cache, CachePolicy::shared(Duration::from_secs(30)));
    }
}
