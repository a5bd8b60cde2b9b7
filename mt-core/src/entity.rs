use serde_json::Value;

/// Named-field access on a stored record.
///
/// Whether a record is new or existing is a property of the operation
/// (create vs update/patch/remove), not of the record.
pub trait Entity: Send + Sync {
    fn field(&self, name: &str) -> Option<&Value>;

    fn set_field(&mut self, name: &str, value: Value);

    /// Primary identity of the record.
    fn id(&self) -> Option<Value> {
        self.field("id").cloned()
    }

    /// True when the field is absent or explicitly null.
    fn is_unset(&self, name: &str) -> bool {
        self.field(name).map_or(true, Value::is_null)
    }
}

impl Entity for Value {
    fn field(&self, name: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(name))
    }

    /// No-op on non-object values.
    fn set_field(&mut self, name: &str, value: Value) {
        if let Some(map) = self.as_object_mut() {
            map.insert(name.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_counts_as_unset() {
        let row = json!({"account_id": null, "name": "x"});
        assert!(row.is_unset("account_id"));
        assert!(row.is_unset("missing"));
        assert!(!row.is_unset("name"));
    }

    #[test]
    fn set_field_overwrites() {
        let mut row = json!({"account_id": 3});
        row.set_field("account_id", json!(5));
        assert_eq!(row.field("account_id"), Some(&json!(5)));
    }
}
