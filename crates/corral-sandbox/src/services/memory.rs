//! In-process key/value store service.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::{Value, json};

use super::Service;
use crate::error::ServiceError;

const METHODS: &[&str] = &["get", "set", "delete", "keys", "clear"];

/// A JSON key/value store that lives as long as the host keeps it.
///
/// State written by one execution is visible to the next, which makes it the
/// simplest way to carry data between calls.
///
/// | method   | argument                     | returns                    |
/// |----------|------------------------------|----------------------------|
/// | `get`    | `"key"` or `#{ key }`        | stored value or `()`       |
/// | `set`    | `#{ key, value }`            | previous value or `()`     |
/// | `delete` | `"key"` or `#{ key }`        | whether a value was removed|
/// | `keys`   | none                         | sorted array of keys       |
/// | `clear`  | none                         | number of entries removed  |
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Read a value from the host side.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Write a value from the host side.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.write().insert(key.into(), value)
    }
}

fn key_arg(method: &str, args: &Value) -> Result<String, ServiceError> {
    match args {
        Value::String(key) => Ok(key.clone()),
        Value::Object(map) => match map.get("key") {
            Some(Value::String(key)) => Ok(key.clone()),
            _ => Err(ServiceError::invalid_arguments(method, "expected a string 'key' field")),
        },
        _ => Err(ServiceError::invalid_arguments(
            method,
            "expected a key string or a map with a 'key' field",
        )),
    }
}

impl Service for MemoryStore {
    fn kind(&self) -> &str {
        "memory"
    }

    fn methods(&self) -> &[&'static str] {
        METHODS
    }

    fn call(&self, method: &str, args: Value) -> Result<Value, ServiceError> {
        match method {
            "get" => {
                let key = key_arg(method, &args)?;
                Ok(self.get(&key).unwrap_or(Value::Null))
            }
            "set" => {
                let key = key_arg(method, &args)?;
                let value = args
                    .get("value")
                    .cloned()
                    .ok_or_else(|| ServiceError::invalid_arguments(method, "missing 'value' field"))?;
                Ok(self.set(key, value).unwrap_or(Value::Null))
            }
            "delete" => {
                let key = key_arg(method, &args)?;
                Ok(Value::Bool(self.entries.write().remove(&key).is_some()))
            }
            "keys" => Ok(json!(self.entries.read().keys().collect::<Vec<_>>())),
            "clear" => {
                let mut entries = self.entries.write();
                let removed = entries.len();
                entries.clear();
                Ok(json!(removed))
            }
            other => Err(ServiceError::UnknownMethod {
                service: "memory".to_string(),
                method: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.call("get", json!("a")).unwrap(), Value::Null);
        assert_eq!(
            store.call("set", json!({"key": "a", "value": [1, 2]})).unwrap(),
            Value::Null
        );
        assert_eq!(store.call("get", json!({"key": "a"})).unwrap(), json!([1, 2]));
        assert_eq!(
            store.call("set", json!({"key": "a", "value": 3})).unwrap(),
            json!([1, 2])
        );
        assert_eq!(store.call("delete", json!("a")).unwrap(), json!(true));
        assert_eq!(store.call("delete", json!("a")).unwrap(), json!(false));
    }

    #[test]
    fn test_keys_and_clear() {
        let store = MemoryStore::new();
        store.set("b", json!(1));
        store.set("a", json!(2));
        assert_eq!(store.call("keys", Value::Null).unwrap(), json!(["a", "b"]));
        assert_eq!(store.call("clear", Value::Null).unwrap(), json!(2));
        assert!(store.is_empty());
    }

    #[test]
    fn test_bad_arguments() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.call("get", json!(1)),
            Err(ServiceError::InvalidArguments { .. })
        ));
        assert!(matches!(
            store.call("set", json!({"key": "a"})),
            Err(ServiceError::InvalidArguments { .. })
        ));
    }
}
