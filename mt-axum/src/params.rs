use std::collections::HashMap;

use mt_core::{Query, ServiceParams};
use serde_json::Value;

/// Builds service params from the query string of a REST call.
pub trait FromRestQuery: Sized {
    fn from_rest_query(query: HashMap<String, String>) -> Self;
}

/// Every pair becomes an equality condition, in key order. Values that read
/// as JSON scalars (`7`, `true`, `null`) compare as such; the rest as text.
impl FromRestQuery for ServiceParams {
    fn from_rest_query(query: HashMap<String, String>) -> Self {
        let mut pairs: Vec<_> = query.into_iter().collect();
        pairs.sort();

        let query = pairs
            .into_iter()
            .fold(Query::new(), |q, (field, raw)| q.and_eq(field, scalar(&raw)));
        ServiceParams::new(query)
    }
}

fn scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) if !v.is_object() && !v.is_array() => v,
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pairs_become_equality_conditions() {
        let query = HashMap::from([
            ("title".to_string(), "hello".to_string()),
            ("account_id".to_string(), "7".to_string()),
        ]);
        let params = ServiceParams::from_rest_query(query);

        assert!(!params.skip_scope);
        assert_eq!(
            params.query,
            Query::new().and_eq("account_id", 7).and_eq("title", "hello")
        );
    }

    #[test]
    fn structured_values_stay_text() {
        assert_eq!(scalar("[1,2]"), json!("[1,2]"));
        assert_eq!(scalar("\"quoted\""), json!("quoted"));
        assert_eq!(scalar("true"), json!(true));
    }
}
