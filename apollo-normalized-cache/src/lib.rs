//! A normalized cache for GraphQL responses.
//!
//! Query results are flattened into a [`CacheStore`] where every entity lives once, under a
//! [`CacheKey`] chosen by a [`KeyStrategy`], and is referenced elsewhere by a small stub. From
//! that store the cache can:
//!
//! * [`normalize`] a new result into the store,
//! * [`diff`] a query against the store to find out what still has to be fetched,
//! * [`resolve`] a query from the store alone.
//!
//! ```ignore
//! let mut cache = NormalizedCache::new(Configuration::default());
//! let query = cache.parse("{ user { id name } }", None)?;
//! if let Some(missing) = cache.missing(&query, &variables)? {
//!     let result = fetch(&missing).await?;
//!     cache.write(&missing, &result, &variables)?;
//! }
//! let data = cache.read(&query, &variables)?;
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod cache_key;
pub mod configuration;
mod diff;
mod error;
pub mod json_ext;
mod normalize;
mod resolve;
pub mod spec;
mod store;
pub mod strategy;
mod walk;

pub use crate::cache_key::CacheKey;
pub use crate::configuration::Configuration;
pub use crate::diff::diff;
pub use crate::error::CacheError;
pub use crate::normalize::normalize;
pub use crate::resolve::resolve;
pub use crate::spec::Query;
pub use crate::spec::SpecError;
pub use crate::store::CacheStore;
pub use crate::strategy::ClassifyContext;
pub use crate::strategy::IdentityKeyStrategy;
pub use crate::strategy::KeyDescriptor;
pub use crate::strategy::KeyScope;
pub use crate::strategy::KeyStrategy;

use crate::json_ext::Object;
use crate::json_ext::Value;

/// A store together with the strategy and configuration used to read and write it.
///
/// Writes replace the store only when normalization succeeds.
#[derive(Clone, Debug)]
pub struct NormalizedCache<S = IdentityKeyStrategy> {
    store: CacheStore,
    strategy: S,
    configuration: Configuration,
}

impl NormalizedCache<IdentityKeyStrategy> {
    /// An empty cache using the [`IdentityKeyStrategy`] described by `configuration`.
    pub fn new(configuration: Configuration) -> Self {
        let strategy = IdentityKeyStrategy::new(&configuration.entities);
        Self::with_strategy(configuration, strategy)
    }
}

impl<S> NormalizedCache<S>
where
    S: KeyStrategy,
{
    pub fn with_strategy(configuration: Configuration, strategy: S) -> Self {
        Self {
            store: CacheStore::new(),
            strategy,
            configuration,
        }
    }

    /// Replaces the store, e.g. with one persisted earlier.
    pub fn with_store(mut self, store: CacheStore) -> Self {
        self.store = store;
        self
    }

    /// Parses a query with this cache's configuration.
    pub fn parse(
        &self,
        source: impl Into<String>,
        operation_name: Option<&str>,
    ) -> Result<Query, SpecError> {
        Query::parse(source, operation_name, &self.configuration)
    }

    /// Normalizes `result` into the store.
    pub fn write(
        &mut self,
        query: &Query,
        result: &Value,
        variables: &Object,
    ) -> Result<(), CacheError> {
        self.store = normalize(&self.store, query, result, variables, &self.strategy)?;
        Ok(())
    }

    /// The part of `query` the store cannot answer, if any.
    pub fn missing(&self, query: &Query, variables: &Object) -> Result<Option<Query>, CacheError> {
        diff(&self.store, query, variables, &self.strategy)
    }

    /// The data of `query`, read from the store.
    pub fn read(&self, query: &Query, variables: &Object) -> Result<Value, CacheError> {
        resolve(&self.store, query, variables, &self.strategy)
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn into_store(self) -> CacheStore {
        self.store
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}
