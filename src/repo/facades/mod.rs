//! # Facade Module
//!
//! Facades are the only entry point callers use to reach persistence. Each one wraps a
//! single backend family and exposes typed operations on records, documents, cached
//! values or indexed documents.
//!
//! * **Backend Abstraction:** facades hold trait objects, so callers never learn whether
//!   a PostgreSQL pool or an in-memory store sits behind them.
//! * **Transactions:** relational writes are wrapped in a single-write transaction that
//!   is always released, whatever the outcome.
//! * **Uniform Errors:** every backend failure is mapped to [`FacadeError`] by the
//!   normalizer of its family, and logged through the injected [`OpLogRef`].

use crate::docstore::DocumentStoreRef;
use crate::repo::Repository;
use crate::store::{CacheRef, SearchIndexRef};
use crate::utils::oplog::OpLogRef;

mod facade_error;
pub use facade_error::*;

mod facade_record;
pub use facade_record::*;

mod facade_document;
pub use facade_document::*;

mod facade_cache;
pub use facade_cache::*;

mod facade_search;
pub use facade_search::*;

/// Groups one facade per backend family, all sharing the same log handle.
#[derive(Clone)]
pub struct Persistence {
    pub records: FacadeRecord,
    pub documents: FacadeDocument,
    pub cache: FacadeCache,
    pub search: FacadeSearch,
}

impl Persistence {
    pub fn new(
        repo: Repository,
        documents: DocumentStoreRef,
        cache: CacheRef,
        search: SearchIndexRef,
        log: OpLogRef,
    ) -> Self {
        Self {
            records: FacadeRecord::new(repo, log.clone()),
            documents: FacadeDocument::new(documents, log.clone()),
            cache: FacadeCache::new(cache, log.clone()),
            search: FacadeSearch::new(search, log),
        }
    }

    /// In-memory backends for every family.
    pub fn in_memory(log: OpLogRef) -> Self {
        use std::sync::Arc;

        Self::new(
            Arc::new(crate::repo::MemRelational::new()),
            Arc::new(crate::docstore::MemDocumentStore::new()),
            Arc::new(crate::store::MemCache::new()),
            Arc::new(crate::store::MemSearchIndex::new()),
            log,
        )
    }
}
