//! Selection tree traversal shared by normalize, diff and resolve.
//!
//! All three operations must agree on where a field lives and on which objects are entities,
//! otherwise data written by one could not be found by the others.

use serde_json_bytes::ByteString;

use crate::error::CacheError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Field;
use crate::spec::Query;
use crate::spec::Selection;
use crate::spec::SpecError;
use crate::spec::TYPENAME;
use crate::strategy::ClassifyContext;
use crate::strategy::KeyDescriptor;
use crate::strategy::KeyScope;
use crate::strategy::KeyStrategy;

/// Where a field is stored inside its parent record.
pub(crate) struct Slot {
    /// Key of the field in the parent record.
    pub(crate) key: ByteString,
    /// Kind of inline records stored in this slot.
    pub(crate) kind: String,
    /// Field arguments, variables resolved.
    pub(crate) arguments: Object,
}

pub(crate) struct Walker<'a, S: ?Sized> {
    query: &'a Query,
    variables: Object,
    strategy: &'a S,
}

impl<'a, S> Walker<'a, S>
where
    S: KeyStrategy + ?Sized,
{
    pub(crate) fn new(query: &'a Query, variables: &Object, strategy: &'a S) -> Self {
        Self {
            query,
            variables: query.variables(variables),
            strategy,
        }
    }

    pub(crate) fn query(&self) -> &'a Query {
        self.query
    }

    pub(crate) fn skipped(&self, selection: &Selection) -> Result<bool, CacheError> {
        Ok(selection.include_skip().should_skip(&self.variables)?)
    }

    pub(crate) fn type_applies(&self, type_condition: Option<&str>, record: &Object) -> bool {
        let typename = record.get(TYPENAME).and_then(Value::as_str);
        self.query.type_applies(type_condition, typename)
    }

    /// Collects the fields of `selection_set` that apply to `record`, expanding fragments and
    /// dropping skipped selections.
    pub(crate) fn collect_fields(
        &self,
        selection_set: &'a [Selection],
        record: &Object,
        fields: &mut Vec<&'a Field>,
    ) -> Result<(), CacheError> {
        for selection in selection_set {
            if self.skipped(selection)? {
                continue;
            }
            match selection {
                Selection::Field(field) => fields.push(field),
                Selection::InlineFragment { selection_set, .. } => {
                    if self.type_applies(selection.type_condition(), record) {
                        self.collect_fields(selection_set, record, fields)?;
                    }
                }
                Selection::FragmentSpread { node, .. } => {
                    let name = node.fragment_name.as_str();
                    let fragment = self
                        .query
                        .fragments()
                        .get(name)
                        .ok_or_else(|| SpecError::UnknownFragment(name.to_owned()))?;
                    if self.type_applies(Some(fragment.type_condition()), record) {
                        self.collect_fields(fragment.selection_set(), record, fields)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Classifies the storage slot of `field` in a record of kind `parent_kind`.
    pub(crate) fn slot(&self, parent_kind: &str, field: &Field) -> Result<Slot, CacheError> {
        let arguments = field.resolved_arguments(&self.variables)?;
        let descriptor = self.strategy.classify(&ClassifyContext {
            parent_kind,
            field,
            arguments: &arguments,
            value: None,
            variables: &self.variables,
        });
        Ok(match descriptor {
            Some(descriptor) => Slot {
                key: ByteString::from(descriptor.cache_key()),
                kind: descriptor.kind,
                arguments,
            },
            None => Slot {
                key: ByteString::from(field.name()),
                kind: field.name().to_owned(),
                arguments,
            },
        })
    }

    /// The entity descriptor of an object value of `field`, if the strategy considers it one.
    pub(crate) fn entity(
        &self,
        parent_kind: &str,
        field: &Field,
        slot: &Slot,
        value: &Value,
    ) -> Option<KeyDescriptor> {
        self.strategy
            .classify(&ClassifyContext {
                parent_kind,
                field,
                arguments: &slot.arguments,
                value: Some(value),
                variables: &self.variables,
            })
            .filter(|descriptor| descriptor.scope == KeyScope::Entity)
    }
}
