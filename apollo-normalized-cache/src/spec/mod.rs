//! Selection trees built from GraphQL operations.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod fragments;
mod query;
mod selection;

use displaydoc::Display;
pub use fragments::Fragment;
pub use fragments::Fragments;
pub use query::Query;
pub use selection::Condition;
pub use selection::Field;
pub use selection::IncludeSkip;
pub use selection::Selection;
pub(crate) use selection::input_value;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub(crate) const TYPENAME: &str = "__typename";

/// GraphQL operation errors.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SpecError {
    /// parsing error: {0}
    ParsingError(String),
    /// selection processing recursion limit exceeded
    RecursionLimitExceeded,
    /// Unknown operation named "{0}"
    UnknownOperation(String),
    /// the document contains several operations, an operation name is required
    MultipleOperations,
    /// the document does not contain any operation
    NoOperation,
    /// unknown fragment "{0}"
    UnknownFragment(String),
    /// fragment "{0}" spreads itself
    FragmentCycle(String),
    /// unknown variable "${0}"
    UnknownVariable(String),
    /// invalid value for argument: {0}
    InvalidValue(String),
}

impl SpecError {
    /// Stable error code, suitable for error extensions and metrics.
    pub fn extension_code(&self) -> &'static str {
        match self {
            SpecError::ParsingError(_) => "PARSING_ERROR",
            SpecError::RecursionLimitExceeded => "RECURSION_LIMIT_EXCEEDED",
            SpecError::UnknownOperation(_) => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            SpecError::MultipleOperations | SpecError::NoOperation => {
                "GRAPHQL_VALIDATION_FAILED"
            }
            SpecError::UnknownFragment(_) => "UNKNOWN_FRAGMENT",
            SpecError::FragmentCycle(_) => "FRAGMENT_CYCLE",
            SpecError::UnknownVariable(_) => "UNKNOWN_VARIABLE",
            SpecError::InvalidValue(_) => "INVALID_VALUE",
        }
    }
}
