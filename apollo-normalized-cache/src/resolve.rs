//! Reading query data back from the store.

use serde_json_bytes::ByteString;

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

/// Rebuilds the response data of `query` from `store`, following reference stubs to their
/// entity records.
///
/// The response is keyed by response keys (aliases included) and only contains selected fields.
/// A field absent from the store fails with [`CacheError::MissingField`], a stub whose record is
/// absent with [`CacheError::MissingRecord`]: call [`diff`](crate::diff()) first to know whether
/// the store can answer.
pub fn resolve<S>(
    store: &CacheStore,
    query: &Query,
    variables: &Object,
    strategy: &S,
) -> Result<Value, CacheError>
where
    S: KeyStrategy + ?Sized,
{
    let span = tracing::debug_span!("resolve", operation = query.operation_name());
    let _guard = span.enter();

    let resolver = Resolver {
        walker: Walker::new(query, variables, strategy),
        store,
    };
    let data = resolver.read_selection_set(
        query.root_kind(),
        query.selection_set(),
        store.as_object(),
        &Path::empty(),
    )?;
    Ok(Value::Object(data))
}

struct Resolver<'q, S: ?Sized> {
    walker: Walker<'q, S>,
    store: &'q CacheStore,
}

impl<'q, S> Resolver<'q, S>
where
    S: KeyStrategy + ?Sized,
{
    fn read_selection_set(
        &self,
        parent_kind: &str,
        selection_set: &'q [Selection],
        record: &Object,
        path: &Path,
    ) -> Result<Object, CacheError> {
        let mut fields = Vec::new();
        self.walker.collect_fields(selection_set, record, &mut fields)?;

        let mut data = Object::new();
        for field in fields {
            let path = path.join_key(field.response_key());
            let slot = self.walker.slot(parent_kind, field)?;
            let value = record
                .get(slot.key.as_str())
                .ok_or_else(|| CacheError::MissingField { path: path.clone() })?;
            let value = self.read_value(parent_kind, &slot, field, value, &path)?;
            merge_into(&mut data, ByteString::from(field.response_key()), value);
        }
        Ok(data)
    }

    fn read_value(
        &self,
        parent_kind: &str,
        slot: &Slot,
        field: &'q Field,
        value: &Value,
        path: &Path,
    ) -> Result<Value, CacheError> {
        let Some(selection_set) = field.selection_set() else {
            return Ok(value.clone());
        };

        match value {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    self.read_value(parent_kind, slot, field, item, &path.join_index(index))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(object) => match self.walker.entity(parent_kind, field, slot, value) {
                Some(entity) => {
                    let key = entity.cache_key();
                    let record = self.store.record(&key).ok_or_else(|| {
                        CacheError::MissingRecord {
                            key: key.to_string(),
                            path: path.clone(),
                        }
                    })?;
                    tracing::trace!(%key, %path, "following reference");
                    self.read_selection_set(&entity.kind, selection_set, record, path)
                        .map(Value::Object)
                }
                None => self
                    .read_selection_set(&slot.kind, selection_set, object, path)
                    .map(Value::Object),
            },
            _ => Err(CacheError::InvalidRecord {
                path: path.clone(),
                reason: format!(
                    "expected an object or a list for field '{}', which has a selection set",
                    field.name()
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::configuration::Configuration;
    use crate::strategy::IdentityKeyStrategy;

    fn store(entries: Value) -> CacheStore {
        CacheStore::from(entries.as_object().unwrap().clone())
    }

    fn read(store: &CacheStore, source: &str, variables: Value) -> Result<Value, CacheError> {
        let configuration: Configuration = "possible_types:\n  Media: [Book, Movie]\n"
            .parse()
            .unwrap();
        resolve(
            store,
            &Query::parse(source, None, &configuration).unwrap(),
            variables.as_object().unwrap(),
            &IdentityKeyStrategy::default(),
        )
    }

    fn user_store() -> CacheStore {
        store(json!({
            r#"node({"id":"10"})"#: {"id": "10", "name": "John", "email": "john@example.com"},
            "user": {"id": "10"},
        }))
    }

    #[test]
    fn only_selected_fields_are_returned() {
        assert_eq!(
            read(&user_store(), "{ user { name } }", json!({})).unwrap(),
            json!({"user": {"name": "John"}})
        );
    }

    #[test]
    fn aliases_name_the_response_fields() {
        assert_eq!(
            read(
                &user_store(),
                "{ me: user { id fullName: name } user { email } }",
                json!({})
            )
            .unwrap(),
            json!({
                "me": {"id": "10", "fullName": "John"},
                "user": {"email": "john@example.com"},
            })
        );
    }

    #[test]
    fn duplicate_selections_are_merged() {
        assert_eq!(
            read(&user_store(), "{ user { id } user { name } }", json!({})).unwrap(),
            json!({"user": {"id": "10", "name": "John"}})
        );
    }

    #[test]
    fn missing_field() {
        let error = read(&user_store(), "{ user { id phone } }", json!({})).unwrap_err();
        assert_eq!(error.to_string(), "field missing from the cache at /user/phone");
        assert_eq!(error.extension_code(), "CACHE_MISSING_FIELD");
    }

    #[test]
    fn missing_record() {
        let store = store(json!({"user": {"id": "11"}}));
        assert_eq!(
            read(&store, "{ user { id } }", json!({})).unwrap_err(),
            CacheError::MissingRecord {
                key: r#"node({"id":"11"})"#.to_owned(),
                path: Path::empty().join_key("user"),
            }
        );
    }

    #[test]
    fn fragments_follow_the_typename() {
        let store = store(json!({
            "media": [
                {"__typename": "Book", "title": "Dune", "author": "Frank Herbert"},
                {"__typename": "Movie", "title": "Alien", "director": "Ridley Scott"},
            ],
        }));
        let source = r#"
            { media { title ... on Book { author } ...Movie } }
            fragment Movie on Movie { director }
        "#;
        assert_eq!(
            read(&store, source, json!({})).unwrap(),
            json!({
                "media": [
                    {"title": "Dune", "author": "Frank Herbert"},
                    {"title": "Alien", "director": "Ridley Scott"},
                ],
            })
        );
    }

    #[test]
    fn include_and_skip() {
        let source = "query($withEmail: Boolean = false) { user { name email @include(if: $withEmail) } }";
        assert_eq!(
            read(&user_store(), source, json!({})).unwrap(),
            json!({"user": {"name": "John"}})
        );
        assert_eq!(
            read(&user_store(), source, json!({"withEmail": true})).unwrap(),
            json!({"user": {"name": "John", "email": "john@example.com"}})
        );
    }

    #[test]
    fn scalars_with_a_selection_set_are_invalid() {
        let store = store(json!({"user": "10"}));
        assert!(matches!(
            read(&store, "{ user { id } }", json!({})),
            Err(CacheError::InvalidRecord { .. })
        ));
    }
}
