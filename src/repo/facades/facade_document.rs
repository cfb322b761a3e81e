use super::{DocumentNormalizer, ErrorNormalizer, FacadeError};
use crate::docstore::{DocumentRecord, DocumentStoreRef};
use crate::query::{self, QuerySpec};
use crate::utils::oplog::{OpContext, OpLogRef};

/// Facade over the document store. Each call is a single round trip.
#[derive(Clone)]
pub struct FacadeDocument {
    store: DocumentStoreRef,
    normalizer: DocumentNormalizer,
    log: OpLogRef,
}

impl FacadeDocument {
    pub fn new(store: DocumentStoreRef, log: OpLogRef) -> Self {
        Self {
            store,
            normalizer: DocumentNormalizer::new(log.clone()),
            log,
        }
    }

    pub async fn insert<R: DocumentRecord>(&self, record: &R) -> Result<(), FacadeError> {
        let ctx = OpContext::new("insert", R::COLLECTION);

        let doc = record
            .to_document()
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;
        self.store
            .insert(R::COLLECTION, doc)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "document inserted");
        Ok(())
    }

    /// First document matching the conditions of `spec`. Sort and pagination are ignored.
    pub async fn find_one<R: DocumentRecord>(&self, spec: &QuerySpec) -> Result<R, FacadeError> {
        let ctx = OpContext::new("find_one", R::COLLECTION);

        let query = query::to_document_query(spec)?;
        let doc = self
            .store
            .find_one(R::COLLECTION, &query.filter)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;
        let record = R::from_document(doc).map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "document retrieved");
        Ok(record)
    }

    pub async fn find<R: DocumentRecord>(&self, spec: &QuerySpec) -> Result<Vec<R>, FacadeError> {
        let ctx = OpContext::new("find", R::COLLECTION);

        let query = query::to_document_query(spec)?;
        let docs = self
            .store
            .find(R::COLLECTION, &query)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        let records = docs
            .into_iter()
            .map(R::from_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "documents retrieved");
        Ok(records)
    }

    /// Overwrites the fields of the first document matching `spec` with those of `record`.
    pub async fn update<R: DocumentRecord>(
        &self,
        spec: &QuerySpec,
        record: &R,
    ) -> Result<(), FacadeError> {
        let ctx = OpContext::new("update", R::COLLECTION);

        let query = query::to_document_query(spec)?;
        let changes = record
            .to_document()
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;
        self.store
            .update(R::COLLECTION, &query.filter, changes)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "document updated");
        Ok(())
    }

    pub async fn delete<R: DocumentRecord>(&self, spec: &QuerySpec) -> Result<(), FacadeError> {
        let ctx = OpContext::new("delete", R::COLLECTION);

        let query = query::to_document_query(spec)?;
        self.store
            .delete(R::COLLECTION, &query.filter)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "document deleted");
        Ok(())
    }
}
