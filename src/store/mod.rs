//! # Cache and Search Collaborators
//!
//! Single round-trip delegations with no transactional semantics. A cache miss is a
//! successful `Ok(None)`, never an error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

mod mem;
pub use mem::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection error :: {0}")]
    Connection(String),
    #[error("serialization error :: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported search query :: {0}")]
    UnsupportedQuery(String),
    #[error("invalid key `{0}`")]
    InvalidKey(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Stores a JSON encoded value. Without `ttl` the entry never expires.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), Error>;

    /// Returns `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    async fn exists(&self, key: &str) -> Result<bool, Error>;
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Indexes `doc` under `id`, replacing any previous version.
    async fn index(&self, index: &str, id: &str, doc: serde_json::Value) -> Result<(), Error>;

    /// Runs a query and returns the matching source documents.
    async fn search(
        &self,
        index: &str,
        query: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, Error>;

    async fn delete(&self, index: &str, id: &str) -> Result<(), Error>;
}

pub type CacheRef = Arc<dyn Cache>;
pub type SearchIndexRef = Arc<dyn SearchIndex>;

fn validate_key(key: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidKey(key.to_owned()));
    }
    Ok(())
}
