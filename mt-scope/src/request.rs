//! The parts of an inbound request tenancy cares about.

use std::collections::HashMap;

use serde_json::Value;

/// Server name, environment and session of one request.
///
/// Built by the HTTP adapter (or by hand in tests and workers).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInfo {
    /// Host the request was addressed to, without port.
    pub server_name: String,
    pub env: HashMap<String, String>,
    pub session: Value,
}

impl RequestInfo {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            env: HashMap::new(),
            session: Value::Null,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = session;
        self
    }

    /// `REQUEST_SCHEME` from the environment, `http` when unset.
    pub fn scheme(&self) -> &str {
        self.env
            .get("REQUEST_SCHEME")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("http")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_defaults_to_http() {
        assert_eq!(RequestInfo::new("app.test").scheme(), "http");
        assert_eq!(
            RequestInfo::new("app.test")
                .with_env("REQUEST_SCHEME", "https")
                .scheme(),
            "https"
        );
    }
}
