use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::cache_key::CacheKey;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// Flat mapping from cache keys, or bare root field names, to records.
///
/// Entity records live under their entity [`CacheKey`]. Root fields that are not entities live
/// under their field name (or their argument-qualified key) and usually hold a reference stub.
/// The store serializes as a plain JSON object so that it can be persisted by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheStore {
    entries: Object,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// The record stored under `key`, if it is an object.
    pub fn record(&self, key: &CacheKey) -> Option<&Object> {
        self.entries.get(key.as_str()).and_then(Value::as_object)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ByteString, &Value)> {
        self.entries.iter()
    }

    pub fn as_object(&self) -> &Object {
        &self.entries
    }

    pub fn into_inner(self) -> Object {
        self.entries
    }
}

impl From<Object> for CacheStore {
    fn from(entries: Object) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn serializes_as_a_plain_object() {
        let entries = json!({
            r#"node({"id":"10"})"#: {"id": "10", "name": "John"},
            "user": {"id": "10"},
            "otherUser": null,
        });
        let store = CacheStore::from(entries.as_object().unwrap().clone());
        assert_eq!(store.len(), 3);
        assert!(store.contains_key("otherUser"));
        assert_eq!(
            store
                .record(&CacheKey::new("node", json!({"id": "10"}).as_object().unwrap()))
                .and_then(|record| record.get("name")),
            Some(&json!("John"))
        );
        assert_eq!(store.record(&CacheKey::new("node", &Object::new())), None);

        let serialized = serde_json::to_value(&store).unwrap();
        assert_eq!(serialized, serde_json::to_value(&entries).unwrap());
        let deserialized: CacheStore = serde_json::from_value(serialized).unwrap();
        assert_eq!(deserialized, store);
    }
}
