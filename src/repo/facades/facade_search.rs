use serde::{Serialize, de::DeserializeOwned};

use super::{ErrorNormalizer, FacadeError, StoreNormalizer};
use crate::store::{self, SearchIndexRef};
use crate::utils::oplog::{OpContext, OpLogRef};

/// Typed access to the full-text search index.
///
/// Queries are passed through untouched in the search engine's own JSON DSL.
#[derive(Clone)]
pub struct FacadeSearch {
    index: SearchIndexRef,
    normalizer: StoreNormalizer,
    log: OpLogRef,
}

impl FacadeSearch {
    pub fn new(index: SearchIndexRef, log: OpLogRef) -> Self {
        Self {
            index,
            normalizer: StoreNormalizer::new(log.clone()),
            log,
        }
    }

    pub async fn index<T: Serialize>(
        &self,
        index: &str,
        id: &str,
        doc: &T,
    ) -> Result<(), FacadeError> {
        let ctx = OpContext::new("index", index).with_id(id);

        let doc = serde_json::to_value(doc)
            .map_err(|e| self.normalizer.normalize(&ctx, store::Error::from(e)))?;
        self.index
            .index(index, id, doc)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "document indexed");
        Ok(())
    }

    /// An empty result is a successful empty vector.
    pub async fn search<T: DeserializeOwned>(
        &self,
        index: &str,
        query: &serde_json::Value,
    ) -> Result<Vec<T>, FacadeError> {
        let ctx = OpContext::new("search_index", index);

        let hits = self
            .index
            .search(index, query)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        let docs = hits
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| self.normalizer.normalize(&ctx, store::Error::from(e)))?;

        self.log.success(&ctx, "search executed");
        Ok(docs)
    }

    pub async fn delete(&self, index: &str, id: &str) -> Result<(), FacadeError> {
        let ctx = OpContext::new("unindex", index).with_id(id);
        self.index
            .delete(index, id)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;
        self.log.success(&ctx, "document removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemSearchIndex;
    use crate::utils::oplog::NoopLog;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Post {
        title: String,
        tags: Vec<String>,
    }

    fn post(title: &str, tags: &[&str]) -> Post {
        Post {
            title: title.to_owned(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn index_search_delete() {
        let facade = FacadeSearch::new(Arc::new(MemSearchIndex::new()), NoopLog::shared());

        facade
            .index("posts", "1", &post("Ownership in Rust", &["rust"]))
            .await
            .unwrap();
        facade
            .index("posts", "2", &post("Channels in Go", &["go"]))
            .await
            .unwrap();

        let query = json!({"query": {"match": {"title": "rust"}}});
        let hits: Vec<Post> = facade.search("posts", &query).await.unwrap();
        assert_eq!(hits, vec![post("Ownership in Rust", &["rust"])]);

        facade.delete("posts", "1").await.unwrap();
        let hits: Vec<Post> = facade.search("posts", &query).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn unsupported_query_is_backend_error() {
        let facade = FacadeSearch::new(Arc::new(MemSearchIndex::new()), NoopLog::shared());
        let err = facade
            .search::<Post>("posts", &json!({"query": {"fuzzy": {"title": "rsut"}}}))
            .await
            .unwrap_err();
        assert!(err.is_backend());
    }
}
