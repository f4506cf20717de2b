//! The cache key strategy: decides which objects are shared entities and which fields are
//! stored under an argument-qualified key.
//!
//! The engine consults the strategy in two positions, at normalize, diff and resolve time alike:
//!
//! * **slot** (`value` is `None`): where a field is stored inside its parent record. Any
//!   descriptor stores the field under its [`CacheKey`], `None` stores it under the field name.
//! * **value** (`value` is `Some`): called for every object value of a field, once per list
//!   element. An [`KeyScope::Entity`] descriptor moves the object to its own top-level record and
//!   leaves `args` behind as the reference stub. Any other answer keeps the object inline.
//!
//! Implementations must be deterministic: the engine never remembers earlier answers, and
//! inconsistent answers between normalize and resolve make cached data unreachable.

use serde_json_bytes::ByteString;

use crate::cache_key::CacheKey;
use crate::configuration::Entities;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Field;

/// What a [`KeyDescriptor`] identifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// A shared, identity-keyed entity stored at the top level of the store.
    Entity,
    /// An argument-scoped field stored inside its parent record.
    Field,
}

/// The answer of a [`KeyStrategy`].
#[derive(Clone, Debug, PartialEq)]
pub struct KeyDescriptor {
    pub scope: KeyScope,
    pub kind: String,
    pub args: Object,
}

impl KeyDescriptor {
    pub fn entity(kind: impl Into<String>, args: Object) -> Self {
        Self {
            scope: KeyScope::Entity,
            kind: kind.into(),
            args,
        }
    }

    pub fn field(kind: impl Into<String>, args: Object) -> Self {
        Self {
            scope: KeyScope::Field,
            kind: kind.into(),
            args,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.kind, &self.args)
    }

    /// The reference stub written in place of an entity.
    pub fn stub(&self) -> Value {
        Value::Object(self.args.clone())
    }
}

/// Everything a strategy may look at to classify a field.
#[derive(Clone, Copy, Debug)]
pub struct ClassifyContext<'a> {
    /// Kind of the record containing the field: the root type name (`Query`, `Mutation`...), an
    /// entity kind, or the kind of the enclosing inline record.
    pub parent_kind: &'a str,
    pub field: &'a Field,
    /// Arguments of the field, variables resolved.
    pub arguments: &'a Object,
    /// `None` when classifying the storage slot, the object being stored or read otherwise.
    pub value: Option<&'a Value>,
    pub variables: &'a Object,
}

/// Pluggable cache key policy.
pub trait KeyStrategy {
    fn classify(&self, context: &ClassifyContext<'_>) -> Option<KeyDescriptor>;
}

impl<F> KeyStrategy for F
where
    F: Fn(&ClassifyContext<'_>) -> Option<KeyDescriptor>,
{
    fn classify(&self, context: &ClassifyContext<'_>) -> Option<KeyDescriptor> {
        self(context)
    }
}

/// Default policy: objects carrying every identity field are entities of a single kind, fields
/// with arguments are keyed by field name and arguments.
///
/// With the default [`Entities`] configuration, `{ id: "10", name: "John" }` is stored under
/// `node({"id":"10"})` and `friends(first: 3)` under `friends({"first":3})`.
#[derive(Clone, Debug)]
pub struct IdentityKeyStrategy {
    kind: String,
    identity_fields: Vec<ByteString>,
    key_arguments: bool,
}

impl IdentityKeyStrategy {
    pub fn new(configuration: &Entities) -> Self {
        Self {
            kind: configuration.kind.clone(),
            identity_fields: configuration
                .identity_fields
                .iter()
                .map(|field| ByteString::from(field.as_str()))
                .collect(),
            key_arguments: configuration.key_arguments,
        }
    }

    fn identity(&self, object: &Object) -> Option<Object> {
        if self.identity_fields.is_empty() {
            return None;
        }
        let mut identity = Object::new();
        for field in &self.identity_fields {
            match object.get(field.as_str()) {
                Some(value @ (Value::String(_) | Value::Number(_))) => {
                    identity.insert(field.clone(), value.clone());
                }
                _ => return None,
            }
        }
        Some(identity)
    }
}

impl Default for IdentityKeyStrategy {
    fn default() -> Self {
        Self::new(&Entities::default())
    }
}

impl KeyStrategy for IdentityKeyStrategy {
    fn classify(&self, context: &ClassifyContext<'_>) -> Option<KeyDescriptor> {
        match context.value {
            Some(value) => self
                .identity(value.as_object()?)
                .map(|identity| KeyDescriptor::entity(self.kind.as_str(), identity)),
            None if self.key_arguments && !context.arguments.is_empty() => Some(
                KeyDescriptor::field(context.field.name(), context.arguments.clone()),
            ),
            None => None,
        }
    }
}
