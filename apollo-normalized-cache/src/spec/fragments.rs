use std::collections::HashSet;

use apollo_compiler::Node;
use apollo_compiler::ast;
use indexmap::IndexMap;

use super::selection::selection_set_from_ast;
use crate::spec::Selection;
use crate::spec::SpecError;

/// Fragment definitions of a document, in definition order.
#[derive(Debug, Clone, Default)]
pub struct Fragments {
    map: IndexMap<String, Fragment>,
}

/// A fragment definition.
///
/// The definition node is opaque to the differ: it is printed back verbatim with a pruned query.
#[derive(Debug, Clone)]
pub struct Fragment {
    definition: Node<ast::FragmentDefinition>,
    selection_set: Vec<Selection>,
}

impl Fragment {
    pub fn name(&self) -> &str {
        self.definition.name.as_str()
    }

    pub fn type_condition(&self) -> &str {
        self.definition.type_condition.as_str()
    }

    pub fn selection_set(&self) -> &[Selection] {
        &self.selection_set
    }

    pub(crate) fn definition(&self) -> &Node<ast::FragmentDefinition> {
        &self.definition
    }
}

impl Fragments {
    pub(crate) fn from_ast(
        document: &ast::Document,
        recursion_limit: usize,
    ) -> Result<Self, SpecError> {
        let map = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                // Spec: https://spec.graphql.org/draft/#FragmentDefinition
                ast::Definition::FragmentDefinition(fragment_definition) => {
                    Some(fragment_definition)
                }
                _ => None,
            })
            .map(|fragment_definition| {
                let selection_set =
                    selection_set_from_ast(&fragment_definition.selection_set, 0, recursion_limit)?;
                Ok((
                    fragment_definition.name.as_str().to_owned(),
                    Fragment {
                        definition: fragment_definition.clone(),
                        selection_set,
                    },
                ))
            })
            .collect::<Result<IndexMap<_, _>, SpecError>>()?;
        Ok(Fragments { map })
    }

    pub fn get(&self, key: impl AsRef<str>) -> Option<&Fragment> {
        self.map.get(key.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Checks that every spread reachable from `selection_set` or from a fragment definition
    /// names a defined fragment, and that no fragment spreads itself.
    pub(crate) fn validate(&self, selection_set: &[Selection]) -> Result<(), SpecError> {
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        let roots = spreads(selection_set)
            .into_iter()
            .chain(self.map.keys().map(String::as_str));
        for name in roots {
            self.visit(name, &mut stack, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), SpecError> {
        if done.contains(name) {
            return Ok(());
        }
        if stack.contains(&name) {
            return Err(SpecError::FragmentCycle(name.to_owned()));
        }
        let fragment = self
            .get(name)
            .ok_or_else(|| SpecError::UnknownFragment(name.to_owned()))?;
        stack.push(name);
        for spread in spreads(&fragment.selection_set) {
            self.visit(spread, stack, done)?;
        }
        stack.pop();
        done.insert(name);
        Ok(())
    }

    /// Names of the fragments transitively spread from `selection_set`.
    pub(crate) fn referenced_by(&self, selection_set: &[Selection]) -> HashSet<String> {
        let mut referenced = HashSet::new();
        let mut pending = spreads(selection_set);
        while let Some(name) = pending.pop() {
            if !referenced.insert(name.to_owned()) {
                continue;
            }
            if let Some(fragment) = self.get(name) {
                pending.extend(spreads(&fragment.selection_set));
            }
        }
        referenced
    }
}

/// Fragment names spread anywhere in `selection_set`, fields and inline fragments included.
fn spreads(selection_set: &[Selection]) -> Vec<&str> {
    let mut names = Vec::new();
    collect_spreads(selection_set, &mut names);
    names
}

fn collect_spreads<'a>(selection_set: &'a [Selection], names: &mut Vec<&'a str>) {
    for selection in selection_set {
        match selection {
            Selection::Field(field) => {
                if let Some(selection_set) = field.selection_set() {
                    collect_spreads(selection_set, names);
                }
            }
            Selection::InlineFragment { selection_set, .. } => {
                collect_spreads(selection_set, names)
            }
            Selection::FragmentSpread { node, .. } => names.push(node.fragment_name.as_str()),
        }
    }
}
