//! # Configuration
//!
//! mt-core carries a minimal configuration system based on a simple
//! string key/value store, mirroring Feathers' `app.set()` / `app.get()`.
//! Tenancy settings live under the `multitenant.` prefix and are turned
//! into typed options by `mt-scope`.
//!
//! ```rust
//! use mt_core::MtApp;
//! use serde_json::Value;
//! use mt_core::ServiceParams;
//!
//! let app = MtApp::<Value, ServiceParams>::new();
//! app.set("multitenant.primary_domain", "app.test");
//! app.set("multitenant.primary_subdomains", "www, admin");
//!
//! let snapshot = app.config_snapshot();
//! assert_eq!(snapshot.get("multitenant.primary_domain"), Some("app.test"));
//! assert_eq!(
//!     snapshot.get_list("multitenant.primary_subdomains"),
//!     Some(vec!["www".to_string(), "admin".to_string()])
//! );
//! ```
//!
//! ## Environment overrides
//! Applications may copy environment variables into the store with any
//! convention, for example `MT__MULTITENANT__PRIMARY_DOMAIN` becoming
//! `multitenant.primary_domain`; see [`MtConfig::load_env`].

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MtConfig {
    values: HashMap<String, String>,
}

impl MtConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy `PREFIX`ed environment variables into the store.
    ///
    /// `MT__MULTITENANT__PRIMARY_DOMAIN` with prefix `MT__` becomes
    /// `multitenant.primary_domain`.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_pairs(prefix, std::env::vars());
    }

    fn load_pairs<I>(&mut self, prefix: &str, pairs: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in pairs {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    pub fn snapshot(&self) -> MtConfigSnapshot {
        MtConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MtConfigSnapshot {
    map: HashMap<String, String>,
}

impl MtConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    /// Comma-separated list; blank items are dropped.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, prefix removed.
    pub fn with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .map
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect();
        out.sort();
        out
    }
}
