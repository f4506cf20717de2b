//! Cache errors.
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::json_ext::Path;
use crate::spec::SpecError;

/// Error types for normalize, diff and resolve.
///
/// Every failure is synchronous and reported to the immediate caller: the engine performs no
/// I/O and never retries.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum CacheError {
    /// {0}
    Spec(#[from] SpecError),

    /// invalid result at {path}: {reason}
    InvalidResult {
        /// Where the result did not match the selection tree.
        path: Path,
        /// What was expected.
        reason: String,
    },

    /// field missing from the cache at {path}
    ///
    /// Reading an incomplete cache is a programmer error: call `diff` first and fetch what it
    /// returns.
    MissingField {
        /// The missing field.
        path: Path,
    },

    /// record '{key}' referenced at {path} is missing from the cache
    MissingRecord {
        /// Cache key of the missing record.
        key: String,
        /// Where the reference stub was found.
        path: Path,
    },

    /// invalid record at {path}: {reason}
    InvalidRecord {
        /// Where the record did not match the selection tree.
        path: Path,
        /// What was expected.
        reason: String,
    },
}

impl CacheError {
    /// Stable error code, suitable for error extensions and metrics.
    pub fn extension_code(&self) -> &'static str {
        match self {
            CacheError::Spec(error) => error.extension_code(),
            CacheError::InvalidResult { .. } => "INVALID_RESULT",
            CacheError::MissingField { .. } => "CACHE_MISSING_FIELD",
            CacheError::MissingRecord { .. } => "CACHE_MISSING_RECORD",
            CacheError::InvalidRecord { .. } => "CACHE_INVALID_RECORD",
        }
    }

    /// Path of the offending field, if the error is tied to one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            CacheError::Spec(_) => None,
            CacheError::InvalidResult { path, .. }
            | CacheError::MissingField { path }
            | CacheError::MissingRecord { path, .. }
            | CacheError::InvalidRecord { path, .. } => Some(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let path = Path::empty().join_key("user").join_key("name");
        assert_eq!(
            CacheError::MissingField { path: path.clone() }.to_string(),
            "field missing from the cache at /user/name"
        );
        assert_eq!(
            CacheError::MissingRecord {
                key: r#"node({"id":"10"})"#.to_owned(),
                path,
            }
            .to_string(),
            r#"record 'node({"id":"10"})' referenced at /user/name is missing from the cache"#
        );
        assert_eq!(
            CacheError::from(SpecError::UnknownVariable("id".to_owned())).to_string(),
            "unknown variable \"$id\""
        );
        assert_eq!(
            CacheError::from(SpecError::UnknownFragment("User".to_owned())).extension_code(),
            "UNKNOWN_FRAGMENT"
        );
    }
}
