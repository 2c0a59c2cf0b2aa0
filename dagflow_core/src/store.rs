//! Ordered key-value stores for workflow input and shared task data.
//!
//! [`Store`] is a plain insertion-ordered map from string keys to JSON values.
//! It carries workflow input and is typically built once from JSON or YAML.
//! [`SharedStore`] wraps a `Store` behind an async `RwLock` so any number of
//! running tasks can read and write it concurrently.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};

/// Insertion-ordered key-value store.
///
/// Typed getters fall back to the zero value of their type when the key is
/// absent or holds a value of another type.
///
/// # Examples
///
/// ```
/// use dagflow_core::Store;
/// use serde_json::json;
///
/// let mut store = Store::new();
/// store.set("name", json!("nightly"));
/// store.set("retries", json!(3));
///
/// assert_eq!(store.get_str("name"), "nightly");
/// assert_eq!(store.get_i64("retries"), 3);
/// assert_eq!(store.get_i64("name"), 0);
/// assert_eq!(store.keys().collect::<Vec<_>>(), vec!["name", "retries"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Store {
    entries: IndexMap<String, Value>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a JSON document whose top level is an object.
    pub fn from_json(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_value(value)
    }

    /// Builds a store from a YAML document whose top level is a mapping.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(input)?;
        Self::from_value(value)
    }

    /// Builds a store from a JSON object value.
    ///
    /// `null` is accepted as an empty document.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Null => Ok(Self::new()),
            other => Err(CoreError::InvalidInput(format!(
                "expected a mapping at the top level, found {}",
                value_kind(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Sets `key` to `value`, returning the previous value.
    ///
    /// Overwriting keeps the key's original position.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Removes `key`, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// String value of `key`, or `""`.
    pub fn get_str(&self, key: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Integer value of `key`, or `0`.
    pub fn get_i64(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or_default()
    }

    /// Float value of `key`, or `0.0`. Integers are widened.
    pub fn get_f64(&self, key: &str) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or_default()
    }

    /// Boolean value of `key`, or `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or_default()
    }

    /// Converts the store into a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect::<Map<String, Value>>(),
        )
    }
}

impl FromIterator<(String, Value)> for Store {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut store = Store::new();
        for (key, value) in iter {
            store.set(key, value);
        }
        store
    }
}

/// Serializes as a mapping in insertion order.
impl Serialize for Store {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Store {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Store::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Concurrency-safe key-value store shared between running tasks.
///
/// Cloning a `SharedStore` yields another handle to the same data.
///
/// # Examples
///
/// ```
/// use dagflow_core::SharedStore;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let shared = SharedStore::new();
/// let handle = shared.clone();
///
/// handle.set("seen", json!(1)).await;
/// shared.update("seen", |v| json!(v.and_then(|v| v.as_i64()).unwrap_or(0) + 1)).await;
///
/// assert_eq!(shared.get_i64("seen").await, 2);
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<Store>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.write().await.set(key, value)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().await.remove(key)
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Replaces the value of `key` with `f(current)` under a single write lock.
    ///
    /// Returns the new value.
    pub async fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut store = self.inner.write().await;
        let next = f(store.get(key));
        store.set(key, next.clone());
        next
    }

    pub async fn get_str(&self, key: &str) -> String {
        self.inner.read().await.get_str(key)
    }

    pub async fn get_i64(&self, key: &str) -> i64 {
        self.inner.read().await.get_i64(key)
    }

    pub async fn get_f64(&self, key: &str) -> f64 {
        self.inner.read().await.get_f64(key)
    }

    pub async fn get_bool(&self, key: &str) -> bool {
        self.inner.read().await.get_bool(key)
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> Store {
        self.inner.read().await.clone()
    }
}

impl From<Store> for SharedStore {
    fn from(store: Store) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let store = Store::from_json(r#"{"b": 1, "a": "x", "c": true}"#).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get_i64("b"), 1);
        assert_eq!(store.get_str("a"), "x");
        assert!(store.get_bool("c"));
    }

    #[test]
    fn test_documents_keep_key_order() {
        let from_json = Store::from_json(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        assert_eq!(from_json.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);

        let from_yaml = Store::from_yaml("zeta: 1\nalpha: 2\nmid: 3\n").unwrap();
        assert_eq!(from_yaml.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            serde_json::to_string(&from_yaml).unwrap(),
            r#"{"zeta":1,"alpha":2,"mid":3}"#
        );
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let mut store = Store::from_json(r#"{"c": 1, "a": 2, "b": 3}"#).unwrap();
        store.remove("a");
        store.set("a", json!(4));

        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_from_yaml() {
        let store = Store::from_yaml("region: eu\nbatch: 50\nratio: 0.5\n").unwrap();
        assert_eq!(store.get_str("region"), "eu");
        assert_eq!(store.get_i64("batch"), 50);
        assert_eq!(store.get_f64("ratio"), 0.5);
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = Store::from_json("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err = Store::from_yaml("- a\n- b\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = Store::from_json("{\"unterminated\": ").unwrap_err();
        assert!(matches!(err, CoreError::Json(_)));
    }

    #[test]
    fn test_null_document_is_empty() {
        let store = Store::from_json("null").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_keeps_position() {
        let mut store = Store::new();
        store.set("first", json!(1));
        store.set("second", json!(2));
        let previous = store.set("first", json!(10));

        assert_eq!(previous, Some(json!(1)));
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(store.get_i64("first"), 10);
    }

    #[test]
    fn test_typed_getters_zero_fallback() {
        let mut store = Store::new();
        store.set("text", json!("hello"));

        assert_eq!(store.get_i64("text"), 0);
        assert_eq!(store.get_f64("missing"), 0.0);
        assert!(!store.get_bool("text"));
        assert_eq!(store.get_str("missing"), "");
    }

    #[test]
    fn test_get_f64_widens_integers() {
        let mut store = Store::new();
        store.set("count", json!(4));
        assert_eq!(store.get_f64("count"), 4.0);
    }

    #[test]
    fn test_remove_and_to_value() {
        let mut store = Store::new();
        store.set("a", json!(1));
        store.set("b", json!(2));
        assert_eq!(store.remove("a"), Some(json!(1)));
        assert_eq!(store.remove("a"), None);

        assert_eq!(store.to_value(), json!({"b": 2}));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_serde_uses_insertion_order() {
        let mut store = Store::new();
        store.set("zeta", json!(1));
        store.set("alpha", json!([true]));

        let text = serde_json::to_string(&store).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":[true]}"#);

        let back: Store = serde_yaml::from_str("zeta: 1\nalpha: [true]\n").unwrap();
        assert_eq!(back.get("alpha"), Some(&json!([true])));
        assert!(serde_json::from_str::<Store>("3").is_err());
    }

    #[tokio::test]
    async fn test_shared_store_concurrent_updates() {
        let shared = SharedStore::new();
        let mut handles = Vec::new();

        for _ in 0..20 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                shared
                    .update("counter", |v| {
                        json!(v.and_then(Value::as_i64).unwrap_or(0) + 1)
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(shared.get_i64("counter").await, 20);
    }

    #[tokio::test]
    async fn test_shared_store_snapshot_is_detached() {
        let shared = SharedStore::from(Store::from_json(r#"{"k": "v"}"#).unwrap());
        let snapshot = shared.snapshot().await;

        shared.set("k", json!("changed")).await;

        assert_eq!(snapshot.get_str("k"), "v");
        assert_eq!(shared.get_str("k").await, "changed");
        assert!(shared.contains_key("k").await);
    }
}
