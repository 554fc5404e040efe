use serde_json::Value;

/// Canonical cache key for a set of request parameters: object keys sorted at
/// every depth, serialized compactly, then lower-cased. Parameter order and
/// letter case therefore do not create distinct entries.
pub fn cache_key(params: &Value) -> String {
    canonicalize(params).to_string().to_lowercase()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_irrelevant() {
        let a = json!({"role": "Engineer", "bullet": "Led migration", "tone": {"b": 1, "a": 2}});
        let b = json!({"tone": {"a": 2, "b": 1}, "bullet": "Led migration", "role": "Engineer"});
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn test_key_is_lowercased() {
        assert_eq!(cache_key(&json!({"Text": "ABC"})), r#"{"text":"abc"}"#);
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            cache_key(&json!({"skills": ["rust", "go"]})),
            cache_key(&json!({"skills": ["go", "rust"]}))
        );
    }
}
