use crate::utils::oplog::{OpContext, OpLogRef};
use crate::{docstore, query, repo, store};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical error returned by every facade.
///
/// The wrapped backend error is kept as [`std::error::Error::source`] for logging; callers
/// should only branch on the variant.
#[derive(thiserror::Error, Debug)]
pub enum FacadeError {
    #[error("validation error :: {0}")]
    ValidationError(#[from] query::Error),
    #[error("unable to find data :: {0}")]
    NotFound(#[source] BoxError),
    #[error("backend error :: {0}")]
    BackendError(#[source] BoxError),
}

impl FacadeError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::BackendError(Box::new(err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, Self::BackendError(_))
    }
}

/// Maps the errors of one backend family onto [`FacadeError`].
///
/// Implementors only decide what "no matching data" looks like for their backend;
/// logging and wrapping are shared.
pub trait ErrorNormalizer {
    type Error: std::error::Error + Send + Sync + 'static;

    fn is_not_found(err: &Self::Error) -> bool;

    fn log(&self) -> &OpLogRef;

    fn normalize(&self, ctx: &OpContext, err: Self::Error) -> FacadeError {
        if Self::is_not_found(&err) {
            self.log().not_found(ctx);
            FacadeError::NotFound(Box::new(err))
        } else {
            self.log().failure(ctx, &err);
            FacadeError::BackendError(Box::new(err))
        }
    }
}

#[derive(Clone)]
pub struct SqlNormalizer {
    log: OpLogRef,
}

impl SqlNormalizer {
    pub fn new(log: OpLogRef) -> Self {
        Self { log }
    }
}

impl ErrorNormalizer for SqlNormalizer {
    type Error = repo::Error;

    fn is_not_found(err: &repo::Error) -> bool {
        err.is_not_found()
    }

    fn log(&self) -> &OpLogRef {
        &self.log
    }
}

#[derive(Clone)]
pub struct DocumentNormalizer {
    log: OpLogRef,
}

impl DocumentNormalizer {
    pub fn new(log: OpLogRef) -> Self {
        Self { log }
    }
}

impl ErrorNormalizer for DocumentNormalizer {
    type Error = docstore::Error;

    fn is_not_found(err: &docstore::Error) -> bool {
        err.is_not_found()
    }

    fn log(&self) -> &OpLogRef {
        &self.log
    }
}

/// Cache and search calls have no "not found" failure: a miss is a successful `None`.
#[derive(Clone)]
pub struct StoreNormalizer {
    log: OpLogRef,
}

impl StoreNormalizer {
    pub fn new(log: OpLogRef) -> Self {
        Self { log }
    }
}

impl ErrorNormalizer for StoreNormalizer {
    type Error = store::Error;

    fn is_not_found(_err: &store::Error) -> bool {
        false
    }

    fn log(&self) -> &OpLogRef {
        &self.log
    }
}
