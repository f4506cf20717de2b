//! Describe cache keys for both entities and argument-qualified fields
use std::borrow::Borrow;
use std::fmt;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::json_ext::Object;
use crate::json_ext::Value;

/// Storage slot of a record: a kind token followed by its canonicalized arguments, e.g.
/// `node({"id":"10"})` or `friends({"first":3})`.
///
/// Two keys built from the same kind and the same arguments are equal whatever the insertion
/// order of the arguments. Object keys are sorted recursively, list order is significant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: &str, args: &Object) -> Self {
        let mut key = String::with_capacity(kind.len() + 16);
        key.push_str(kind);
        key.push('(');
        write_canonical_object(&mut key, args);
        key.push(')');
        CacheKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for ByteString {
    fn from(key: CacheKey) -> Self {
        ByteString::from(key.0)
    }
}

impl From<&CacheKey> for ByteString {
    fn from(key: &CacheKey) -> Self {
        ByteString::from(key.0.as_str())
    }
}

fn write_canonical_object(out: &mut String, object: &Object) {
    out.push('{');
    let fields = object
        .iter()
        .sorted_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    for (index, (key, value)) in fields.enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_json_string(out, key.as_str());
        out.push(':');
        write_canonical(out, value);
    }
    out.push('}');
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(object) => write_canonical_object(out, object),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::String(string) => write_json_string(out, string.as_str()),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::Bool(boolean) => out.push_str(if *boolean { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

fn write_json_string(out: &mut String, string: &str) {
    out.push_str(&serde_json::Value::from(string).to_string());
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use serde_json_bytes::json;

    use super::*;

    fn key(kind: &str, args: Value) -> CacheKey {
        CacheKey::new(kind, args.as_object().unwrap())
    }

    #[test]
    fn human_readable() {
        assert_snapshot!(key("node", json!({"id": "10"})), @r#"node({"id":"10"})"#);
        assert_snapshot!(key("friends", json!({"first": 3})), @r#"friends({"first":3})"#);
        assert_snapshot!(key("feed", json!({})), @"feed({})");
    }

    #[test]
    fn argument_order_does_not_matter() {
        let a = key(
            "search",
            json!({"text": "rust", "filter": {"lang": "en", "year": 2024}, "first": 10}),
        );
        let b = key(
            "search",
            json!({"first": 10, "filter": {"year": 2024, "lang": "en"}, "text": "rust"}),
        );
        assert_eq!(a, b);
        assert_snapshot!(a, @r#"search({"filter":{"lang":"en","year":2024},"first":10,"text":"rust"})"#);
    }

    #[test]
    fn kinds_and_arguments_do_not_collide() {
        assert_ne!(key("node", json!({"id": "10"})), key("user", json!({"id": "10"})));
        assert_ne!(key("node", json!({"id": "10"})), key("node", json!({"id": 10})));
        assert_ne!(
            key("tags", json!({"in": ["a", "b"]})),
            key("tags", json!({"in": ["b", "a"]}))
        );
    }

    #[test]
    fn strings_are_escaped() {
        assert_snapshot!(
            key("search", json!({"text": "say \"hi\"\n"})),
            @r#"search({"text":"say \"hi\"\n"})"#
        );
    }
}
