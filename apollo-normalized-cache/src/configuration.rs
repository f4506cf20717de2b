//! Cache configuration.

use std::collections::HashMap;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// The configuration of the normalized cache.
///
/// ```yaml
/// limits:
///   recursion_limit: 256
/// entities:
///   kind: node
///   identity_fields: [id]
/// possible_types:
///   Media: [Book, Movie]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Limits applied when building selection trees.
    pub limits: Limits,

    /// How the default key strategy recognizes entities.
    pub entities: Entities,

    /// Concrete types of each abstract (interface or union) type, used to decide whether a
    /// fragment's type condition applies to an object carrying a `__typename`.
    pub possible_types: HashMap<String, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Limits {
    /// Maximum nesting of selection sets in a parsed operation.
    pub recursion_limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            recursion_limit: 512,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Entities {
    /// Kind token of entity cache keys, e.g. `node` in `node({"id":"10"})`.
    pub kind: String,

    /// Fields that identify an entity. An object is an entity when all of them are present and
    /// are strings or numbers.
    pub identity_fields: Vec<String>,

    /// Store fields with arguments under a key derived from those arguments.
    pub key_arguments: bool,
}

impl Default for Entities {
    fn default() -> Self {
        Self {
            kind: "node".to_owned(),
            identity_fields: vec!["id".to_owned()],
            key_arguments: true,
        }
    }
}

impl FromStr for Configuration {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

/// JSON schema of the configuration file.
pub fn generate_config_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Configuration)
}
