//! Query parsing and printing.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use serde_json_bytes::ByteString;

use super::selection::selection_set_from_ast;
use crate::configuration::Configuration;
use crate::json_ext::Object;
use crate::spec::Fragments;
use crate::spec::Selection;
use crate::spec::SpecError;
use crate::spec::input_value;

/// A GraphQL operation together with the fragments it can spread.
///
/// `Display` prints the operation and the fragment definitions it references.
#[derive(Debug, Clone)]
pub struct Query {
    operation: Node<ast::OperationDefinition>,
    selection_set: Vec<Selection>,
    fragments: Fragments,
    default_variables: Object,
    possible_types: Arc<HashMap<String, Vec<String>>>,
}

impl Query {
    /// Parses `source` and selects the operation to execute.
    ///
    /// `operation_name` may only be omitted when the document contains a single operation.
    pub fn parse(
        source: impl Into<String>,
        operation_name: Option<&str>,
        configuration: &Configuration,
    ) -> Result<Self, SpecError> {
        let document = ast::Document::parse(source, "query.graphql")
            .map_err(|invalid| SpecError::ParsingError(invalid.errors.to_string()))?;
        Self::from_ast(&document, operation_name, configuration)
    }

    pub fn from_ast(
        document: &ast::Document,
        operation_name: Option<&str>,
        configuration: &Configuration,
    ) -> Result<Self, SpecError> {
        let recursion_limit = configuration.limits.recursion_limit;
        let mut operations = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) => Some(operation),
                _ => None,
            });

        let operation = match operation_name {
            Some(name) => operations
                .find(|operation| operation.name.as_ref().is_some_and(|n| n.as_str() == name))
                .ok_or_else(|| SpecError::UnknownOperation(name.to_owned()))?,
            None => match (operations.next(), operations.next()) {
                (Some(operation), None) => operation,
                (None, _) => return Err(SpecError::NoOperation),
                (Some(_), Some(_)) => return Err(SpecError::MultipleOperations),
            },
        }
        .clone();

        let selection_set = selection_set_from_ast(&operation.selection_set, 0, recursion_limit)?;
        let fragments = Fragments::from_ast(document, recursion_limit)?;
        fragments.validate(&selection_set)?;

        let mut default_variables = Object::new();
        for variable in &operation.variables {
            if let Some(default_value) = &variable.default_value {
                default_variables.insert(
                    ByteString::from(variable.name.as_str()),
                    input_value(default_value, &Object::new())?,
                );
            }
        }

        tracing::trace!(
            operation = operation.name.as_ref().map(|name| name.as_str()),
            fragments = fragments.len(),
            "parsed query"
        );

        Ok(Query {
            operation,
            selection_set,
            fragments,
            default_variables,
            possible_types: Arc::new(configuration.possible_types.clone()),
        })
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation.name.as_ref().map(|name| name.as_str())
    }

    pub fn operation_type(&self) -> ast::OperationType {
        self.operation.operation_type
    }

    /// Kind of the root record, passed to the key strategy as the parent kind of root fields.
    pub fn root_kind(&self) -> &'static str {
        match self.operation_type() {
            ast::OperationType::Query => "Query",
            ast::OperationType::Mutation => "Mutation",
            ast::OperationType::Subscription => "Subscription",
        }
    }

    pub fn selection_set(&self) -> &[Selection] {
        &self.selection_set
    }

    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    /// Variables declared with a default value in the operation.
    pub fn default_variables(&self) -> &Object {
        &self.default_variables
    }

    /// The caller's variables, completed with the operation's defaults.
    pub(crate) fn variables(&self, variables: &Object) -> Object {
        let mut merged = self.default_variables.clone();
        for (name, value) in variables.iter() {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    /// The same operation, selecting `selection_set` instead.
    pub(crate) fn with_selection_set(&self, selection_set: Vec<Selection>) -> Query {
        Query {
            operation: self.operation.clone(),
            selection_set,
            fragments: self.fragments.clone(),
            default_variables: self.default_variables.clone(),
            possible_types: self.possible_types.clone(),
        }
    }

    /// Whether a fragment with `type_condition` applies to an object of type `typename`.
    ///
    /// Without a type condition, or without a known `__typename`, fragments always apply.
    pub(crate) fn type_applies(&self, type_condition: Option<&str>, typename: Option<&str>) -> bool {
        match (type_condition, typename) {
            (Some(type_condition), Some(typename)) => {
                type_condition == typename
                    || self
                        .possible_types
                        .get(type_condition)
                        .is_some_and(|types| types.iter().any(|ty| ty == typename))
            }
            _ => true,
        }
    }

    /// Builds a document containing the operation and the fragments it references. Variable
    /// definitions no longer used by the selections are left out.
    pub fn to_document(&self) -> ast::Document {
        let mut operation = (*self.operation).clone();
        operation.selection_set = self.selection_set.iter().map(Selection::to_ast).collect();

        let referenced = if self.fragments.is_empty() {
            HashSet::new()
        } else {
            self.fragments.referenced_by(&self.selection_set)
        };

        let mut used = HashSet::new();
        variables_in_selection_set(&self.selection_set, &mut used);
        for fragment in self
            .fragments
            .iter()
            .filter(|fragment| referenced.contains(fragment.name()))
        {
            variables_in_directives(&fragment.definition().directives, &mut used);
            variables_in_selection_set(fragment.selection_set(), &mut used);
        }
        operation
            .variables
            .retain(|variable| used.contains(variable.name.as_str()));

        let mut document = ast::Document::new();
        document
            .definitions
            .push(ast::Definition::OperationDefinition(Node::new(operation)));
        document.definitions.extend(
            self.fragments
                .iter()
                .filter(|fragment| referenced.contains(fragment.name()))
                .map(|fragment| ast::Definition::FragmentDefinition(fragment.definition().clone())),
        );
        document
    }
}

fn variables_in_selection_set(selection_set: &[Selection], used: &mut HashSet<String>) {
    for selection in selection_set {
        match selection {
            Selection::Field(field) => {
                for argument in field.arguments() {
                    variables_in_value(&argument.value, used);
                }
                variables_in_directives(field.directives(), used);
                variables_in_selection_set(field.selection_set().unwrap_or_default(), used);
            }
            Selection::InlineFragment {
                node,
                selection_set,
                ..
            } => {
                variables_in_directives(&node.directives, used);
                variables_in_selection_set(selection_set, used);
            }
            Selection::FragmentSpread { node, .. } => {
                variables_in_directives(&node.directives, used)
            }
        }
    }
}

fn variables_in_directives(directives: &ast::DirectiveList, used: &mut HashSet<String>) {
    for directive in &directives.0 {
        for argument in &directive.arguments {
            variables_in_value(&argument.value, used);
        }
    }
}

fn variables_in_value(value: &ast::Value, used: &mut HashSet<String>) {
    match value {
        ast::Value::Variable(name) => {
            used.insert(name.as_str().to_owned());
        }
        ast::Value::List(items) => {
            for item in items {
                variables_in_value(item, used);
            }
        }
        ast::Value::Object(fields) => {
            for (_, item) in fields {
                variables_in_value(item, used);
            }
        }
        _ => {}
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn parse(source: &str) -> Result<Query, SpecError> {
        Query::parse(source, None, &Configuration::default())
    }

    #[test]
    fn selects_the_only_operation() {
        let query = parse("query GetUser { user { id } }").unwrap();
        assert_eq!(query.operation_name(), Some("GetUser"));
        assert_eq!(query.root_kind(), "Query");
        assert_eq!(query.selection_set().len(), 1);
    }

    #[test]
    fn operation_selection() {
        let source = "query A { a } mutation B { b }";
        assert_eq!(parse(source).unwrap_err(), SpecError::MultipleOperations);
        let query = Query::parse(source, Some("B"), &Configuration::default()).unwrap();
        assert_eq!(query.root_kind(), "Mutation");
        assert_eq!(
            Query::parse(source, Some("C"), &Configuration::default()).unwrap_err(),
            SpecError::UnknownOperation("C".to_owned())
        );
        assert_eq!(
            parse("fragment F on User { id }").unwrap_err(),
            SpecError::NoOperation
        );
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(
            parse("{ user { id }"),
            Err(SpecError::ParsingError(_))
        ));
    }

    #[test]
    fn spreads_must_be_defined() {
        assert_eq!(
            parse("{ user { ...User } }").unwrap_err(),
            SpecError::UnknownFragment("User".to_owned())
        );
    }

    #[test]
    fn default_variables() {
        let query = parse("query($first: Int = 10, $after: String) { feed(first: $first) { id } }")
            .unwrap();
        assert_eq!(
            serde_json_bytes::Value::Object(query.default_variables().clone()),
            json!({"first": 10})
        );
        let provided = json!({"first": 3, "after": "abc"});
        assert_eq!(
            serde_json_bytes::Value::Object(query.variables(provided.as_object().unwrap())),
            json!({"first": 3, "after": "abc"})
        );
    }

    #[test]
    fn type_conditions() {
        let configuration: Configuration = "possible_types:\n  Media: [Book, Movie]\n"
            .parse()
            .unwrap();
        let query = Query::parse("{ media { id } }", None, &configuration).unwrap();
        assert!(query.type_applies(Some("Media"), Some("Book")));
        assert!(!query.type_applies(Some("Media"), Some("User")));
        assert!(query.type_applies(Some("User"), Some("User")));
        assert!(!query.type_applies(Some("Book"), Some("Movie")));
        assert!(query.type_applies(Some("Media"), None));
        assert!(query.type_applies(None, Some("User")));
    }

    #[test]
    fn printing_keeps_only_used_variables() {
        let query = parse(
            "query($id: ID!, $skip: Boolean!, $size: Int, $unused: String) { user(id: $id) { id } settings @skip(if: $skip) { theme ...Avatar } } fragment Avatar on Settings { avatar(options: { sizes: [$size] }) }",
        )
        .unwrap();
        let printed = query.to_string();
        assert!(printed.contains("$id: ID!"));
        assert!(!printed.contains("$unused"));

        let pruned = query.with_selection_set(query.selection_set()[1..].to_vec());
        let printed = pruned.to_string();
        assert!(!printed.contains("$id"));
        assert!(printed.contains("$skip: Boolean!"));
        assert!(printed.contains("$size: Int"));

        let pruned = query.with_selection_set(query.selection_set()[..1].to_vec());
        assert_eq!(
            pruned.to_string(),
            parse("query($id: ID!) { user(id: $id) { id } }")
                .unwrap()
                .to_string()
        );
    }

    #[test]
    fn printing_keeps_only_referenced_fragments() {
        let query = parse(
            "{ user { ...A } } fragment A on User { id ...B } fragment B on User { name } fragment C on User { id }",
        )
        .unwrap();
        let printed = query.to_string();
        assert!(printed.contains("fragment A on User"));
        assert!(printed.contains("fragment B on User"));
        assert!(!printed.contains("fragment C on User"));
        // printing is stable
        assert_eq!(
            parse(&printed).unwrap().to_string(),
            printed,
        );
    }
}
