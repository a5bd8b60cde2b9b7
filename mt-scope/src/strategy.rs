//! Qualifier strategies: how a request names its tenant.

use std::sync::Arc;

use serde_json::Value;

use crate::options::Strategy;
use crate::request::RequestInfo;

/// Derives the tenant qualifier from a request.
///
/// Must be pure: the same request always yields the same qualifier. An empty
/// qualifier means the request has no tenant.
pub trait QualifierSource: Send + Sync {
    fn qualifier(&self, request: &RequestInfo) -> String;
}

/// Subdomain of the primary domain.
#[derive(Debug, Clone)]
pub struct DomainQualifier {
    primary_domain: String,
}

impl DomainQualifier {
    pub fn new(primary_domain: impl Into<String>) -> Self {
        Self {
            primary_domain: primary_domain.into().to_ascii_lowercase(),
        }
    }
}

impl QualifierSource for DomainQualifier {
    fn qualifier(&self, request: &RequestInfo) -> String {
        let host = request.server_name.to_ascii_lowercase();
        let host = host.split(':').next().unwrap_or_default();

        if self.primary_domain.is_empty()
            || !host.contains(&self.primary_domain)
            || host.matches('.').count() <= 1
        {
            return String::new();
        }

        let suffix = format!(".{}", self.primary_domain);
        host.strip_suffix(&suffix).unwrap_or_default().to_string()
    }
}

/// Value at a dotted path of the session, e.g. `Auth.User.account`.
#[derive(Debug, Clone)]
pub struct SessionQualifier {
    path: String,
}

impl SessionQualifier {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl QualifierSource for SessionQualifier {
    fn qualifier(&self, request: &RequestInfo) -> String {
        let mut node = &request.session;
        for segment in self.path.split('.').filter(|s| !s.is_empty()) {
            let next = match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(v) => node = v,
                None => return String::new(),
            }
        }

        match node {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// The source a configured strategy reads from.
pub fn source_for(strategy: &Strategy, primary_domain: &str) -> Arc<dyn QualifierSource> {
    match strategy {
        Strategy::Domain => Arc::new(DomainQualifier::new(primary_domain)),
        Strategy::Session { path } => Arc::new(SessionQualifier::new(path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn domain(host: &str) -> String {
        DomainQualifier::new("app.test").qualifier(&RequestInfo::new(host))
    }

    #[test]
    fn subdomain_of_primary_domain() {
        assert_eq!(domain("acme.app.test"), "acme");
        assert_eq!(domain("ACME.App.Test:8080"), "acme");
        assert_eq!(domain("www.app.test"), "www");
    }

    #[test]
    fn only_the_primary_suffix_is_stripped() {
        assert_eq!(domain("acme.beta.app.test"), "acme.beta");
    }

    #[test]
    fn primary_and_unrelated_hosts_have_no_qualifier() {
        assert_eq!(domain("app.test"), "");
        assert_eq!(domain("app.test:3000"), "");
        assert_eq!(domain("acme.other.test"), "");
        assert_eq!(domain("localhost"), "");
        assert_eq!(domain(""), "");
    }

    #[test]
    fn session_path_lookup() {
        let source = SessionQualifier::new("Auth.User.account");
        let request = |session| RequestInfo::new("app.test").with_session(session);

        assert_eq!(
            source.qualifier(&request(json!({"Auth": {"User": {"account": "acme"}}}))),
            "acme"
        );
        assert_eq!(
            source.qualifier(&request(json!({"Auth": {"User": {"account": 42}}}))),
            "42"
        );
        assert_eq!(
            source.qualifier(&request(json!({"Auth": {"User": {"account": null}}}))),
            ""
        );
        assert_eq!(source.qualifier(&request(json!({"Auth": {}}))), "");
        assert_eq!(source.qualifier(&request(Value::Null)), "");
    }

    #[test]
    fn session_path_indexes_arrays() {
        let source = SessionQualifier::new("accounts.1");
        let request = RequestInfo::new("app.test").with_session(json!({"accounts": ["a", "b"]}));
        assert_eq!(source.qualifier(&request), "b");
    }

    #[test]
    fn strategy_selects_the_source() {
        let request = RequestInfo::new("acme.app.test").with_session(json!({"tenant": "beta"}));

        let by_domain = source_for(&Strategy::Domain, "app.test");
        let by_session = source_for(
            &Strategy::Session {
                path: "tenant".to_string(),
            },
            "app.test",
        );

        assert_eq!(by_domain.qualifier(&request), "acme");
        assert_eq!(by_session.qualifier(&request), "beta");
    }
}
