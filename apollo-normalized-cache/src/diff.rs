//! Pruning a query down to what the store cannot answer.

use serde_json_bytes::ByteString;

use crate::error::CacheError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Field;
use crate::spec::Query;
use crate::spec::Selection;
use crate::spec::SpecError;
use crate::spec::TYPENAME;
use crate::store::CacheStore;
use crate::strategy::KeyStrategy;
use crate::walk::Slot;
use crate::walk::Walker;

/// Returns the part of `query` that must be fetched to answer it, or `None` when the store
/// already holds everything it selects.
///
/// * a field absent from its record is kept as written, sub-selections included;
/// * a null value satisfies any sub-selection;
/// * lists are atomic: if one element misses data, the whole field is kept;
/// * fragment spreads are kept as written, and their definitions printed with the query;
/// * when anything is missing from an entity, its identity fields are selected so that the
///   response can be normalized back into the same record;
/// * `__typename` is selected next to type-conditioned inline fragments when the record does not
///   hold it yet, otherwise every fragment would keep applying to it.
pub fn diff<S>(
    store: &CacheStore,
    query: &Query,
    variables: &Object,
    strategy: &S,
) -> Result<Option<Query>, CacheError>
where
    S: KeyStrategy + ?Sized,
{
    let span = tracing::debug_span!("diff", operation = query.operation_name());
    let _guard = span.enter();

    let differ = Differ {
        walker: Walker::new(query, variables, strategy),
        store,
    };
    let selection_set = differ.diff_selection_set(
        query.root_kind(),
        query.selection_set(),
        store.as_object(),
        &[],
    )?;

    if selection_set.is_empty() {
        tracing::debug!("query answered by the cache");
        Ok(None)
    } else {
        tracing::debug!(
            selections = selection_set.len(),
            "query partially answered by the cache"
        );
        Ok(Some(query.with_selection_set(selection_set)))
    }
}

struct Differ<'q, S: ?Sized> {
    walker: Walker<'q, S>,
    store: &'q CacheStore,
}

impl<'q, S> Differ<'q, S>
where
    S: KeyStrategy + ?Sized,
{
    /// The selections of `selection_set` missing from `record`, empty if none are.
    ///
    /// `identity` lists the fields kept alongside missing ones.
    fn diff_selection_set(
        &self,
        parent_kind: &str,
        selection_set: &'q [Selection],
        record: &Object,
        identity: &[ByteString],
    ) -> Result<Vec<Selection>, CacheError> {
        let mut pruned = Vec::new();
        let mut missing = false;

        for selection in selection_set {
            if self.walker.skipped(selection)? {
                continue;
            }
            match selection {
                Selection::Field(field) => {
                    let slot = self.walker.slot(parent_kind, field)?;
                    let Some(value) = record.get(slot.key.as_str()) else {
                        missing = true;
                        pruned.push(selection.clone());
                        continue;
                    };
                    match self.diff_value(parent_kind, &slot, field, value)? {
                        Some(field) => {
                            missing = true;
                            pruned.push(Selection::Field(field));
                        }
                        None if identity.iter().any(|name| name.as_str() == field.name()) => {
                            pruned.push(selection.clone());
                        }
                        None => {}
                    }
                }
                Selection::InlineFragment {
                    node,
                    include_skip,
                    selection_set,
                } => {
                    if !self.walker.type_applies(selection.type_condition(), record) {
                        continue;
                    }
                    let selection_set =
                        self.diff_selection_set(parent_kind, selection_set, record, identity)?;
                    if !selection_set.is_empty() {
                        missing = true;
                        pruned.push(Selection::InlineFragment {
                            node: node.clone(),
                            include_skip: include_skip.clone(),
                            selection_set,
                        });
                    }
                }
                Selection::FragmentSpread { node, .. } => {
                    let name = node.fragment_name.as_str();
                    if self.walker.query().fragments().get(name).is_none() {
                        return Err(SpecError::UnknownFragment(name.to_owned()).into());
                    }
                    missing = true;
                    pruned.push(selection.clone());
                }
            }
        }

        if !missing {
            pruned.clear();
        } else if record.get(TYPENAME).is_none()
            && pruned.iter().any(|selection| selection.type_condition().is_some())
        {
            select_leaf(&mut pruned, TYPENAME);
        }
        Ok(pruned)
    }

    /// The part of `field` not satisfied by its cached `value`, if any.
    fn diff_value(
        &self,
        parent_kind: &str,
        slot: &Slot,
        field: &'q Field,
        value: &Value,
    ) -> Result<Option<Field>, CacheError> {
        let Some(selection_set) = field.selection_set() else {
            return Ok(None);
        };

        match value {
            Value::Null => Ok(None),
            Value::Array(items) => {
                for item in items {
                    if self.diff_value(parent_kind, slot, field, item)?.is_some() {
                        tracing::trace!(field = field.name(), "list element incomplete");
                        return Ok(Some(field.clone()));
                    }
                }
                Ok(None)
            }
            Value::Object(object) => {
                let selection_set = match self.walker.entity(parent_kind, field, slot, value) {
                    Some(entity) => {
                        let Some(record) = self.store.record(&entity.cache_key()) else {
                            tracing::trace!(key = %entity.cache_key(), "entity missing");
                            return Ok(Some(field.clone()));
                        };
                        let identity: Vec<ByteString> = entity.args.keys().cloned().collect();
                        let mut selection_set = self.diff_selection_set(
                            &entity.kind,
                            selection_set,
                            record,
                            &identity,
                        )?;
                        if !selection_set.is_empty() {
                            for name in identity.iter().rev() {
                                select_leaf(&mut selection_set, name.as_str());
                            }
                        }
                        selection_set
                    }
                    None => self.diff_selection_set(&slot.kind, selection_set, object, &[])?,
                };
                Ok((!selection_set.is_empty()).then(|| field.with_selection_set(selection_set)))
            }
            _ => Ok(Some(field.clone())),
        }
    }
}

/// Selects the `name` field first in `selection_set`, unless it is already selected unaliased.
fn select_leaf(selection_set: &mut Vec<Selection>, name: &str) {
    let selected = selection_set.iter().any(|selection| {
        matches!(selection, Selection::Field(field) if field.name() == name && field.alias().is_none())
    });
    if selected {
        return;
    }
    match Field::leaf(name) {
        Some(field) => selection_set.insert(0, Selection::Field(field)),
        None => tracing::debug!(field = name, "not a valid field name, cannot select it"),
    }
}
