//! Writing query results into the store.

use serde_json_bytes::ByteString;

use crate::cache_key::CacheKey;
use crate::error::CacheError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::merge_into;
use crate::spec::Field;
use crate::spec::Query;
use crate::spec::Selection;
use crate::store::CacheStore;
use crate::strategy::KeyStrategy;
use crate::walk::Slot;
use crate::walk::Walker;

/// Flattens `result`, the data of `query`, into a copy of `store`.
///
/// Entities recognized by `strategy` are merged field by field into their top-level record and
/// replaced by their reference stub. Root fields are merged into the top level of the store. A
/// slot that switches between an entity stub and an inline object is overwritten, not merged.
/// Fields selected by the query but absent from the result are skipped. On error, nothing is
/// returned and `store` is untouched.
pub fn normalize<S>(
    store: &CacheStore,
    query: &Query,
    result: &Value,
    variables: &Object,
    strategy: &S,
) -> Result<CacheStore, CacheError>
where
    S: KeyStrategy + ?Sized,
{
    let span = tracing::debug_span!("normalize", operation = query.operation_name());
    let _guard = span.enter();

    let data = result.as_object().ok_or_else(|| CacheError::InvalidResult {
        path: Path::empty(),
        reason: "expected an object at the root of the result".to_owned(),
    })?;

    let mut entries = store.as_object().clone();
    let mut normalizer = Normalizer {
        walker: Walker::new(query, variables, strategy),
        entries: &mut entries,
        entities: 0,
    };

    let fields = normalizer.write_selection_set(
        query.root_kind(),
        query.selection_set(),
        data,
        &Path::empty(),
    )?;
    apply(
        &normalizer.walker,
        query.root_kind(),
        fields,
        &mut *normalizer.entries,
    );

    let entities = normalizer.entities;
    tracing::debug!(
        entities,
        records = entries.len(),
        "normalized query result"
    );
    Ok(CacheStore::from(entries))
}

/// A field value ready to be stored. Entities it contains are already in the store.
enum Written<'q> {
    /// Scalars, nulls and values of fields without a selection set.
    Leaf(Value),
    /// Reference stub of the entity stored under the key.
    Stub(CacheKey, Value),
    /// Object kept inside its parent, with the kind of its slot.
    Inline(String, Vec<WrittenField<'q>>),
    List(Vec<Written<'q>>),
}

struct WrittenField<'q> {
    field: &'q Field,
    slot: Slot,
    written: Written<'q>,
}

struct Normalizer<'q, 's, S: ?Sized> {
    walker: Walker<'q, S>,
    entries: &'s mut Object,
    entities: usize,
}

impl<'q, S> Normalizer<'q, '_, S>
where
    S: KeyStrategy + ?Sized,
{
    fn write_selection_set(
        &mut self,
        parent_kind: &str,
        selection_set: &'q [Selection],
        data: &Object,
        path: &Path,
    ) -> Result<Vec<WrittenField<'q>>, CacheError> {
        let mut fields = Vec::new();
        self.walker.collect_fields(selection_set, data, &mut fields)?;

        let mut written_fields = Vec::with_capacity(fields.len());
        for field in fields {
            let response_key = field.response_key();
            let Some(value) = data.get(response_key) else {
                tracing::debug!(%path, field = response_key, "field missing from the result");
                continue;
            };
            let path = path.join_key(response_key);
            let slot = self.walker.slot(parent_kind, field)?;
            let written = self.write_value(parent_kind, &slot, field, value, &path)?;
            written_fields.push(WrittenField {
                field,
                slot,
                written,
            });
        }
        Ok(written_fields)
    }

    fn write_value(
        &mut self,
        parent_kind: &str,
        slot: &Slot,
        field: &'q Field,
        value: &Value,
        path: &Path,
    ) -> Result<Written<'q>, CacheError> {
        let Some(selection_set) = field.selection_set() else {
            return Ok(Written::Leaf(value.clone()));
        };

        match value {
            Value::Null => Ok(Written::Leaf(Value::Null)),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    self.write_value(parent_kind, slot, field, item, &path.join_index(index))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Written::List),
            Value::Object(object) => match self.walker.entity(parent_kind, field, slot, value) {
                Some(entity) => {
                    let key = entity.cache_key();
                    let fields =
                        self.write_selection_set(&entity.kind, selection_set, object, path)?;
                    tracing::trace!(%key, %path, "writing entity");
                    self.write_entity(&key, &entity.kind, fields);
                    Ok(Written::Stub(key, entity.stub()))
                }
                None => {
                    let fields =
                        self.write_selection_set(&slot.kind, selection_set, object, path)?;
                    Ok(Written::Inline(slot.kind.clone(), fields))
                }
            },
            _ => Err(CacheError::InvalidResult {
                path: path.clone(),
                reason: format!(
                    "expected an object or a list for field '{}', which has a selection set",
                    field.name()
                ),
            }),
        }
    }

    fn write_entity(&mut self, key: &CacheKey, kind: &str, fields: Vec<WrittenField<'q>>) {
        if !matches!(self.entries.get(key.as_str()), Some(Value::Object(_))) {
            self.entries
                .insert(ByteString::from(key), Value::Object(Object::new()));
        }
        if let Some(Value::Object(record)) = self.entries.get_mut(key.as_str()) {
            apply(&self.walker, kind, fields, record);
        }
        self.entities += 1;
    }
}

/// Stores `fields` into `record`, a record of kind `parent_kind`.
///
/// A value merges into its slot only when the slot holds a stub of the same entity or, for inline
/// objects, an inline record. Anything else is replaced.
fn apply<S>(
    walker: &Walker<'_, S>,
    parent_kind: &str,
    fields: Vec<WrittenField<'_>>,
    record: &mut Object,
) where
    S: KeyStrategy + ?Sized,
{
    for WrittenField {
        field,
        slot,
        written,
    } in fields
    {
        let existing_entity = record
            .get(slot.key.as_str())
            .filter(|existing| existing.is_object())
            .map(|existing| walker.entity(parent_kind, field, &slot, existing));

        match written {
            Written::Leaf(value) => merge_into(record, slot.key, value),
            Written::List(items) => {
                let items = items
                    .into_iter()
                    .map(|item| materialize(walker, item))
                    .collect();
                record.insert(slot.key, Value::Array(items));
            }
            Written::Stub(key, stub) => {
                let same_entity = existing_entity
                    .flatten()
                    .is_some_and(|existing| existing.cache_key() == key);
                if same_entity {
                    merge_into(record, slot.key, stub);
                } else {
                    record.insert(slot.key, stub);
                }
            }
            Written::Inline(kind, fields) => {
                if !matches!(existing_entity, Some(None)) {
                    record.insert(slot.key.clone(), Value::Object(Object::new()));
                }
                if let Some(Value::Object(inline)) = record.get_mut(slot.key.as_str()) {
                    apply(walker, &kind, fields, inline);
                }
            }
        }
    }
}

fn materialize<S>(walker: &Walker<'_, S>, written: Written<'_>) -> Value
where
    S: KeyStrategy + ?Sized,
{
    match written {
        Written::Leaf(value) | Written::Stub(_, value) => value,
        Written::List(items) => Value::Array(
            items
                .into_iter()
                .map(|item| materialize(walker, item))
                .collect(),
        ),
        Written::Inline(kind, fields) => {
            let mut record = Object::new();
            apply(walker, &kind, fields, &mut record);
            Value::Object(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::configuration::Configuration;
    use crate::strategy::ClassifyContext;
    use crate::strategy::IdentityKeyStrategy;
    use crate::strategy::KeyDescriptor;

    fn query(source: &str) -> Query {
        Query::parse(source, None, &Configuration::default()).unwrap()
    }

    fn write(store: &CacheStore, source: &str, result: Value) -> Result<CacheStore, CacheError> {
        normalize(
            store,
            &query(source),
            &result,
            &Object::new(),
            &IdentityKeyStrategy::default(),
        )
    }

    fn entries(store: CacheStore) -> Value {
        Value::Object(store.into_inner())
    }

    #[test]
    fn entities_are_merged_not_overwritten() {
        let store = write(
            &CacheStore::new(),
            "{ user { id name } }",
            json!({"user": {"id": "10", "name": "John"}}),
        )
        .unwrap();
        let store = write(
            &store,
            "{ me { id email } }",
            json!({"me": {"id": "10", "email": "john@example.com"}}),
        )
        .unwrap();

        assert_eq!(
            entries(store),
            json!({
                r#"node({"id":"10"})"#: {"id": "10", "name": "John", "email": "john@example.com"},
                "user": {"id": "10"},
                "me": {"id": "10"},
            })
        );
    }

    #[test]
    fn newer_values_win() {
        let store = write(
            &CacheStore::new(),
            "{ user { id name } }",
            json!({"user": {"id": "10", "name": "John"}}),
        )
        .unwrap();
        let store = write(
            &store,
            "{ user { id name } }",
            json!({"user": {"id": "10", "name": "Johnny"}}),
        )
        .unwrap();
        assert_eq!(
            store.get(r#"node({"id":"10"})"#),
            Some(&json!({"id": "10", "name": "Johnny"}))
        );
    }

    #[test]
    fn aliases_are_stored_under_the_field_name() {
        let store = write(
            &CacheStore::new(),
            "{ me: user { id fullName: name } }",
            json!({"me": {"id": "10", "fullName": "John"}}),
        )
        .unwrap();
        assert_eq!(
            entries(store),
            json!({
                r#"node({"id":"10"})"#: {"id": "10", "name": "John"},
                "user": {"id": "10"},
            })
        );
    }

    #[test]
    fn objects_without_identity_stay_inline() {
        let store = write(
            &CacheStore::new(),
            "{ settings { theme location { city } } }",
            json!({"settings": {"theme": "dark", "location": {"city": "Paris"}}}),
        )
        .unwrap();
        assert_eq!(
            entries(store),
            json!({"settings": {"theme": "dark", "location": {"city": "Paris"}}})
        );
    }

    #[test]
    fn inline_objects_replace_entity_stubs() {
        let store = write(
            &CacheStore::new(),
            "{ owner { id name } }",
            json!({"owner": {"id": "1", "name": "Ada"}}),
        )
        .unwrap();
        let store = write(&store, "{ owner { name } }", json!({"owner": {"name": "Grace"}})).unwrap();
        assert_eq!(store.get("owner"), Some(&json!({"name": "Grace"})));

        let store = write(
            &store,
            "{ owner { id name } }",
            json!({"owner": {"id": "2", "name": "Linus"}}),
        )
        .unwrap();
        assert_eq!(store.get("owner"), Some(&json!({"id": "2"})));
    }

    #[test]
    fn nested_slots_switch_shape_inside_entities() {
        let store = write(
            &CacheStore::new(),
            "{ user { id manager { id name } } }",
            json!({"user": {"id": "10", "manager": {"id": "20", "name": "Ada"}}}),
        )
        .unwrap();
        let store = write(
            &store,
            "{ user { id manager { name } } }",
            json!({"user": {"id": "10", "manager": {"name": "Grace"}}}),
        )
        .unwrap();
        assert_eq!(
            store.get(r#"node({"id":"10"})"#),
            Some(&json!({"id": "10", "manager": {"name": "Grace"}}))
        );
    }

    #[test]
    fn root_fields_keyed_like_their_entity_share_its_record() {
        let store = write(
            &CacheStore::new(),
            r#"{ node(id: "10") { id name } }"#,
            json!({"node": {"id": "10", "name": "John"}}),
        )
        .unwrap();
        assert_eq!(
            entries(store),
            json!({r#"node({"id":"10"})"#: {"id": "10", "name": "John"}})
        );
    }

    #[test]
    fn missing_result_fields_are_skipped() {
        let store = write(
            &CacheStore::new(),
            "{ user { id name email } }",
            json!({"user": {"id": "10", "name": "John"}}),
        )
        .unwrap();
        assert_eq!(
            store.get(r#"node({"id":"10"})"#),
            Some(&json!({"id": "10", "name": "John"}))
        );
    }

    #[test]
    fn scalars_cannot_have_a_selection_set() {
        let store = CacheStore::new();
        let error = write(
            &store,
            "{ user { id friends { id } } }",
            json!({"user": {"id": "10", "friends": [{"id": "11"}, "12"]}}),
        )
        .unwrap_err();
        assert_eq!(
            error.path().map(ToString::to_string).as_deref(),
            Some("/user/friends/1")
        );
        assert_eq!(error.extension_code(), "INVALID_RESULT");

        assert!(matches!(
            write(&store, "{ user { id } }", json!(["not", "an", "object"])),
            Err(CacheError::InvalidResult { .. })
        ));
    }

    #[test]
    fn the_input_store_is_not_modified() {
        let store = write(
            &CacheStore::new(),
            "{ user { id name } }",
            json!({"user": {"id": "10", "name": "John"}}),
        )
        .unwrap();
        let before = store.clone();
        let after = write(
            &store,
            "{ user { id name } }",
            json!({"user": {"id": "10", "name": "Johnny"}}),
        )
        .unwrap();
        assert_eq!(store, before);
        assert_ne!(store, after);
    }

    #[test]
    fn custom_strategies_choose_the_keys() {
        let query = query("{ viewer { login repositories { name } } }");
        let strategy = |context: &ClassifyContext<'_>| match context.value {
            Some(value) => value
                .as_object()?
                .get("login")
                .map(|login| {
                    let mut args = Object::new();
                    args.insert(ByteString::from("login"), login.clone());
                    KeyDescriptor::entity("account", args)
                }),
            None => None,
        };

        let store = normalize(
            &CacheStore::new(),
            &query,
            &json!({"viewer": {"login": "octocat", "repositories": [{"name": "hello"}]}}),
            &Object::new(),
            &strategy,
        )
        .unwrap();
        assert_eq!(
            entries(store),
            json!({
                r#"account({"login":"octocat"})"#: {
                    "login": "octocat",
                    "repositories": [{"name": "hello"}],
                },
                "viewer": {"login": "octocat"},
            })
        );
    }
}
