//! Performance oriented JSON manipulation.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = serde_json_bytes::Map<ByteString, Value>;

/// An element of a [`Path`].
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index path element.
    Index(usize),

    /// A key path element.
    Key(String),
}

/// A path into a result or cache tree, e.g. `/user/friends/0/name`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path with `key` appended.
    pub fn join_key(&self, key: impl Into<String>) -> Path {
        let mut elements = self.0.clone();
        elements.push(PathElement::Key(key.into()));
        Path(elements)
    }

    /// Returns a new path with `index` appended.
    pub fn join_index(&self, index: usize) -> Path {
        let mut elements = self.0.clone();
        elements.push(PathElement::Index(index));
        Path(elements)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "/");
        }
        for element in &self.0 {
            write!(f, "/")?;
            match element {
                PathElement::Index(index) => write!(f, "{index}")?,
                PathElement::Key(key) => write!(f, "{key}")?,
            }
        }
        Ok(())
    }
}

/// Extension trait for [`Value`].
pub trait ValueExt {
    /// Deep merge the JSON objects, array and override the values in `&mut self` if they already
    /// exists.
    fn deep_merge(&mut self, other: Self);
}

impl ValueExt for Value {
    fn deep_merge(&mut self, other: Self) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b.into_iter() {
                    match a.get_mut(key.as_str()) {
                        Some(existing) => existing.deep_merge(value),
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (a, b) => {
                *a = b;
            }
        }
    }
}

/// Merges `value` into `object[key]`, field by field when both sides are objects.
pub(crate) fn merge_into(object: &mut Object, key: ByteString, value: Value) {
    match object.get_mut(key.as_str()) {
        Some(existing) => existing.deep_merge(value),
        None => {
            object.insert(key, value);
        }
    }
}
