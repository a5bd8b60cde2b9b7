//! Filters handed to services.
//!
//! A [`Query`] is an AND of [`Condition`]s. Before-hooks append to it
//! (tenant scoping) and services apply it to whatever store they wrap.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;

/// A single predicate on a named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// `field = value`
    Eq { field: String, value: Value },
    /// `field IN (values)`
    In { field: String, values: Vec<Value> },
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In {
            field: field.into(),
            values,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. } | Condition::In { field, .. } => field,
        }
    }

    /// A missing field never matches.
    pub fn matches<E: Entity + ?Sized>(&self, entity: &E) -> bool {
        let Some(actual) = entity.field(self.field()) else {
            return false;
        };
        match self {
            Condition::Eq { value, .. } => actual == value,
            Condition::In { values, .. } => values.iter().any(|v| v == actual),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub conditions: Vec<Condition>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::eq(field, value));
        self
    }

    pub fn and_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::is_in(field, values));
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches<E: Entity + ?Sized>(&self, entity: &E) -> bool {
        self.conditions.iter().all(|c| c.matches(entity))
    }
}

/// Params type used by the bundled services and the HTTP adapter.
#[derive(Debug, Clone, Default)]
pub struct ServiceParams {
    pub query: Query,
    /// Bypass tenant scoping for this call. Set only by internal lookups.
    pub skip_scope: bool,
}

impl ServiceParams {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            skip_scope: false,
        }
    }

    /// Params for an internal call that must not be scoped.
    pub fn unscoped(query: Query) -> Self {
        Self {
            query,
            skip_scope: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn in_condition_uses_strict_equality() {
        let row = json!({"id": 1, "account_id": 7});
        assert!(Condition::is_in("account_id", vec![json!(0), json!(7)]).matches(&row));
        assert!(!Condition::is_in("account_id", vec![json!(0), json!("7")]).matches(&row));
    }

    #[test]
    fn missing_field_matches_nothing() {
        let row = json!({"id": 1});
        assert!(!Query::new().and_eq("account_id", 1).matches(&row));
        assert!(Query::new().matches(&row));
    }
}
