//! # Document Store
//!
//! Boundary between the facades and a MongoDB shaped document store. Filters and find
//! options are produced by [`crate::query::to_document_query`]; records convert to and
//! from BSON documents through [`DocumentRecord`].

use async_trait::async_trait;
use bson::Document;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::query::CompiledDocumentQuery;

mod mem;
pub use mem::*;
pub(crate) use mem::{compare_documents, matches};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no matching document")]
    NoDocuments,
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),
    #[error("bad pattern :: {0}")]
    BadPattern(#[from] regex::Error),
    #[error("serialization error :: {0}")]
    Serialization(#[from] bson::ser::Error),
    #[error("deserialization error :: {0}")]
    Deserialization(#[from] bson::de::Error),
    #[error("connection error :: {0}")]
    Connection(String),
}

impl Error {
    /// Returns `true` if the store signaled that no document matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoDocuments)
    }
}

/// A type persisted as a document of a collection.
///
/// The default hooks go through `serde`; override them when the stored shape differs
/// from the Rust one.
pub trait DocumentRecord: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn to_document(&self) -> Result<Document, Error> {
        Ok(bson::to_document(self)?)
    }

    fn from_document(doc: Document) -> Result<Self, Error> {
        Ok(bson::from_document(doc)?)
    }
}

#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn insert(&self, collection: &str, doc: Document) -> Result<(), Error>;

    /// Fails with [`Error::NoDocuments`] when nothing matches.
    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Document, Error>;

    async fn find(
        &self,
        collection: &str,
        query: &CompiledDocumentQuery,
    ) -> Result<Vec<Document>, Error>;

    /// Sets the fields of `changes` on the first matching document.
    /// Fails with [`Error::NoDocuments`] when nothing matches.
    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        changes: Document,
    ) -> Result<(), Error>;

    /// Removes the first matching document.
    /// Fails with [`Error::NoDocuments`] when nothing matches.
    async fn delete(&self, collection: &str, filter: &Document) -> Result<(), Error>;
}

pub type DocumentStoreRef = Arc<dyn DocumentBackend>;
