use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use serde_json_bytes::ByteString;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::SpecError;

/// A selection in a GraphQL selection set.
///
/// The AST node of each selection is kept so that a pruned tree can be printed back to GraphQL
/// with its arguments, aliases and directives untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    InlineFragment {
        node: Node<ast::InlineFragment>,
        include_skip: IncludeSkip,
        selection_set: Vec<Selection>,
    },
    FragmentSpread {
        node: Node<ast::FragmentSpread>,
        include_skip: IncludeSkip,
    },
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    node: Node<ast::Field>,
    include_skip: IncludeSkip,
    selection_set: Option<Vec<Selection>>,
}

impl Selection {
    pub(crate) fn from_ast(
        selection: &ast::Selection,
        mut count: usize,
        recursion_limit: usize,
    ) -> Result<Option<Self>, SpecError> {
        if count > recursion_limit {
            tracing::error!("selection processing recursion limit({recursion_limit}) exceeded");
            return Err(SpecError::RecursionLimitExceeded);
        }
        count += 1;
        Ok(match selection {
            // Spec: https://spec.graphql.org/draft/#Field
            ast::Selection::Field(field) => {
                let include_skip = IncludeSkip::parse(&field.directives);
                if include_skip.statically_skipped() {
                    return Ok(None);
                }

                let selection_set = if field.selection_set.is_empty() {
                    None
                } else {
                    let selection_set =
                        selection_set_from_ast(&field.selection_set, count, recursion_limit)?;
                    // Can be empty with a statically skipped selection set
                    if selection_set.is_empty() {
                        return Ok(None);
                    }
                    Some(selection_set)
                };

                Some(Selection::Field(Field {
                    node: field.clone(),
                    include_skip,
                    selection_set,
                }))
            }
            // Spec: https://spec.graphql.org/draft/#InlineFragment
            ast::Selection::InlineFragment(inline_fragment) => {
                let include_skip = IncludeSkip::parse(&inline_fragment.directives);
                if include_skip.statically_skipped() {
                    return Ok(None);
                }
                let selection_set =
                    selection_set_from_ast(&inline_fragment.selection_set, count, recursion_limit)?;
                if selection_set.is_empty() {
                    return Ok(None);
                }

                Some(Selection::InlineFragment {
                    node: inline_fragment.clone(),
                    include_skip,
                    selection_set,
                })
            }
            // Spec: https://spec.graphql.org/draft/#FragmentSpread
            ast::Selection::FragmentSpread(fragment_spread) => {
                let include_skip = IncludeSkip::parse(&fragment_spread.directives);
                if include_skip.statically_skipped() {
                    return Ok(None);
                }

                Some(Selection::FragmentSpread {
                    node: fragment_spread.clone(),
                    include_skip,
                })
            }
        })
    }

    pub fn include_skip(&self) -> &IncludeSkip {
        match self {
            Selection::Field(field) => &field.include_skip,
            Selection::InlineFragment { include_skip, .. }
            | Selection::FragmentSpread { include_skip, .. } => include_skip,
        }
    }

    /// Type condition of an inline fragment, if it has one.
    pub fn type_condition(&self) -> Option<&str> {
        match self {
            Selection::InlineFragment { node, .. } => {
                node.type_condition.as_ref().map(|name| name.as_str())
            }
            _ => None,
        }
    }

    pub(crate) fn to_ast(&self) -> ast::Selection {
        match self {
            Selection::Field(field) => ast::Selection::Field(field.to_ast()),
            Selection::InlineFragment {
                node,
                selection_set,
                ..
            } => {
                let mut inline_fragment = (**node).clone();
                inline_fragment.selection_set =
                    selection_set.iter().map(Selection::to_ast).collect();
                ast::Selection::InlineFragment(Node::new(inline_fragment))
            }
            Selection::FragmentSpread { node, .. } => ast::Selection::FragmentSpread(node.clone()),
        }
    }
}

pub(crate) fn selection_set_from_ast(
    selections: &[ast::Selection],
    count: usize,
    recursion_limit: usize,
) -> Result<Vec<Selection>, SpecError> {
    selections
        .iter()
        .filter_map(|selection| Selection::from_ast(selection, count, recursion_limit).transpose())
        .collect()
}

impl Field {
    pub fn name(&self) -> &str {
        self.node.name.as_str()
    }

    pub fn alias(&self) -> Option<&str> {
        self.node.alias.as_ref().map(|alias| alias.as_str())
    }

    /// The key under which this field appears in a response.
    pub fn response_key(&self) -> &str {
        self.alias().unwrap_or_else(|| self.name())
    }

    pub fn arguments(&self) -> &[Node<ast::Argument>] {
        &self.node.arguments
    }

    pub fn directives(&self) -> &ast::DirectiveList {
        &self.node.directives
    }

    pub fn selection_set(&self) -> Option<&[Selection]> {
        self.selection_set.as_deref()
    }

    pub fn include_skip(&self) -> &IncludeSkip {
        &self.include_skip
    }

    /// Argument values with every variable reference replaced by its value.
    pub fn resolved_arguments(&self, variables: &Object) -> Result<Object, SpecError> {
        let mut arguments = Object::new();
        for argument in self.arguments() {
            arguments.insert(
                ByteString::from(argument.name.as_str()),
                input_value(&argument.value, variables)?,
            );
        }
        Ok(arguments)
    }

    /// An unaliased field without arguments, directives or sub-selections, if `name` is a valid
    /// GraphQL name.
    pub(crate) fn leaf(name: &str) -> Option<Field> {
        let node = ast::Field {
            alias: None,
            name: Name::new(name).ok()?,
            arguments: Vec::new(),
            directives: ast::DirectiveList::default(),
            selection_set: Vec::new(),
        };
        Some(Field {
            include_skip: IncludeSkip::parse(&node.directives),
            node: Node::new(node),
            selection_set: None,
        })
    }

    /// The same field, selecting `selection_set` instead.
    pub(crate) fn with_selection_set(&self, selection_set: Vec<Selection>) -> Field {
        Field {
            node: self.node.clone(),
            include_skip: self.include_skip.clone(),
            selection_set: Some(selection_set),
        }
    }

    fn to_ast(&self) -> Node<ast::Field> {
        let mut field = (*self.node).clone();
        field.selection_set = self
            .selection_set
            .iter()
            .flatten()
            .map(Selection::to_ast)
            .collect();
        Node::new(field)
    }
}

/// Converts a GraphQL input value to JSON, reading variable references from `variables`.
pub(crate) fn input_value(value: &ast::Value, variables: &Object) -> Result<Value, SpecError> {
    Ok(match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => Value::from(name.as_str()),
        ast::Value::Variable(name) => variables
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| SpecError::UnknownVariable(name.as_str().to_owned()))?,
        ast::Value::String(string) => Value::from(string.as_str()),
        ast::Value::Float(float) => float
            .try_to_f64()
            .map(Value::from)
            .map_err(|_| SpecError::InvalidValue("float overflow".to_owned()))?,
        ast::Value::Int(int) => match int.as_str().parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => int
                .try_to_f64()
                .map(Value::from)
                .map_err(|_| SpecError::InvalidValue("integer overflow".to_owned()))?,
        },
        ast::Value::Boolean(boolean) => Value::Bool(*boolean),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| input_value(item, variables))
                .collect::<Result<_, _>>()?,
        ),
        ast::Value::Object(fields) => {
            let mut object = Object::new();
            for (name, value) in fields {
                object.insert(
                    ByteString::from(name.as_str()),
                    input_value(value, variables)?,
                );
            }
            Value::Object(object)
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Yes,
    No,
    Variable(String),
}

impl IncludeSkip {
    pub(crate) fn parse(directives: &ast::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in &directives.0 {
            if include.is_none() && directive.name.as_str() == "include" {
                include = Condition::parse(directive)
            }
            if skip.is_none() && directive.name.as_str() == "skip" {
                skip = Condition::parse(directive)
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn statically_skipped(&self) -> bool {
        matches!(self.skip, Condition::Yes) || matches!(self.include, Condition::No)
    }

    pub fn should_skip(&self, variables: &Object) -> Result<bool, SpecError> {
        Ok(self.skip.eval(variables)? || !self.include.eval(variables)?)
    }
}

impl Condition {
    pub(crate) fn parse(directive: &ast::Directive) -> Option<Self> {
        let condition = directive
            .arguments
            .iter()
            .find(|argument| argument.name.as_str() == "if")?;
        match &*condition.value {
            ast::Value::Boolean(true) => Some(Condition::Yes),
            ast::Value::Boolean(false) => Some(Condition::No),
            ast::Value::Variable(variable) => {
                Some(Condition::Variable(variable.as_str().to_owned()))
            }
            _ => None,
        }
    }

    pub fn eval(&self, variables: &Object) -> Result<bool, SpecError> {
        match self {
            Condition::Yes => Ok(true),
            Condition::No => Ok(false),
            Condition::Variable(variable_name) => match variables.get(variable_name.as_str()) {
                Some(Value::Bool(value)) => Ok(*value),
                Some(_) => Err(SpecError::InvalidValue(format!(
                    "${variable_name} must be a boolean"
                ))),
                None => Err(SpecError::UnknownVariable(variable_name.clone())),
            },
        }
    }
}
