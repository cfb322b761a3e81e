use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

use super::{ErrorNormalizer, FacadeError, StoreNormalizer};
use crate::store::{self, CacheRef};
use crate::utils::oplog::{OpContext, OpLogRef};

/// Typed access to the key/value cache. Values are stored as JSON.
#[derive(Clone)]
pub struct FacadeCache {
    cache: CacheRef,
    normalizer: StoreNormalizer,
    log: OpLogRef,
    default_ttl: Option<Duration>,
}

impl FacadeCache {
    pub fn new(cache: CacheRef, log: OpLogRef) -> Self {
        Self {
            cache,
            normalizer: StoreNormalizer::new(log.clone()),
            log,
            default_ttl: None,
        }
    }

    /// TTL applied by [`FacadeCache::set`] when the caller passes none.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), FacadeError> {
        let ctx = OpContext::new("set_cache", key);

        let encoded = serde_json::to_string(value)
            .map_err(|e| self.normalizer.normalize(&ctx, store::Error::from(e)))?;
        self.cache
            .set(key, encoded, ttl.or(self.default_ttl))
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "value cached");
        Ok(())
    }

    /// Returns `Ok(None)` on a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, FacadeError> {
        let ctx = OpContext::new("get_cache", key);

        let Some(raw) = self
            .cache
            .get(key)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?
        else {
            self.log.success(&ctx, "cache miss");
            return Ok(None);
        };

        let value = serde_json::from_str(&raw)
            .map_err(|e| self.normalizer.normalize(&ctx, store::Error::from(e)))?;

        self.log.success(&ctx, "cache hit");
        Ok(Some(value))
    }

    pub async fn delete(&self, key: &str) -> Result<(), FacadeError> {
        let ctx = OpContext::new("delete_cache", key);
        self.cache
            .delete(key)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;
        self.log.success(&ctx, "value evicted");
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool, FacadeError> {
        let ctx = OpContext::new("exists_cache", key);
        let found = self
            .cache
            .exists(key)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;
        self.log.success(&ctx, "existence checked");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemCache;
    use crate::utils::oplog::testing::RecordingLog;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: i64,
        roles: Vec<String>,
    }

    fn facade() -> (FacadeCache, Arc<MemCache>, Arc<RecordingLog>) {
        let cache = Arc::new(MemCache::new());
        let log = Arc::new(RecordingLog::default());
        (FacadeCache::new(cache.clone(), log.clone()), cache, log)
    }

    #[tokio::test]
    async fn typed_roundtrip() {
        let (facade, _, _) = facade();
        let session = Session {
            user: 1,
            roles: vec!["admin".into()],
        };

        facade.set("session:1", &session, None).await.unwrap();
        assert!(facade.exists("session:1").await.unwrap());
        assert_eq!(
            facade.get::<Session>("session:1").await.unwrap(),
            Some(session)
        );

        facade.delete("session:1").await.unwrap();
        assert_eq!(facade.get::<Session>("session:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn default_ttl_applies() {
        let (facade, _, _) = facade();
        let facade = facade.with_default_ttl(Some(Duration::from_millis(10)));

        facade.set("short", &1_u32, None).await.unwrap();
        facade
            .set("long", &2_u32, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(facade.get::<u32>("short").await.unwrap(), None);
        assert_eq!(facade.get::<u32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn failures_are_backend_errors() {
        let (facade, cache, log) = facade();
        facade.set("n", &"not a number", None).await.unwrap();

        assert!(facade.get::<u32>("n").await.unwrap_err().is_backend());

        cache.set_unavailable(true);
        assert!(facade.exists("n").await.unwrap_err().is_backend());
        assert_eq!(log.failures(), 2);
    }
}
