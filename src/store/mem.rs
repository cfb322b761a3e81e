use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::{Cache, Error, SearchIndex, validate_key};

fn poisoned<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::Connection(e.to_string())
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory cache with per-entry expiry. Expired entries read as misses.
#[derive(Default)]
pub struct MemCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    unavailable: AtomicBool,
}

impl MemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until they are swept.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes every following call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Connection("cache unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for MemCache {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), Error> {
        self.check_available()?;
        validate_key(key)?;
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.retain(|_, e| e.is_live(now));
        entries.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.check_available()?;
        validate_key(key)?;
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.check_available()?;
        validate_key(key)?;
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.get(key).await?.is_some())
    }
}

/// In-memory search index.
///
/// Understands `match_all`, `match` (any term, case-insensitive substring) and `term`
/// (exact value) queries, plus an optional `size`.
#[derive(Default)]
pub struct MemSearchIndex {
    indices: RwLock<HashMap<String, BTreeMap<String, Json>>>,
}

impl MemSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

enum Matcher<'a> {
    All,
    Match { field: &'a str, terms: Vec<String> },
    Term { field: &'a str, value: &'a Json },
}

impl<'a> Matcher<'a> {
    fn parse(query: &'a Json) -> Result<Self, Error> {
        let Some(inner) = query.get("query") else {
            return Ok(Self::All);
        };

        let unsupported = || Error::UnsupportedQuery(inner.to_string());
        let clause = inner.as_object().ok_or_else(unsupported)?;
        let (kind, body) = clause.iter().next().ok_or_else(unsupported)?;
        let single_field = || {
            body.as_object()
                .and_then(|o| o.iter().next())
                .ok_or_else(unsupported)
        };

        match kind.as_str() {
            "match_all" => Ok(Self::All),
            "match" => {
                let (field, text) = single_field()?;
                let text = text.as_str().ok_or_else(unsupported)?;
                Ok(Self::Match {
                    field,
                    terms: text.split_whitespace().map(str::to_lowercase).collect(),
                })
            }
            "term" => {
                let (field, value) = single_field()?;
                Ok(Self::Term { field, value })
            }
            _ => Err(unsupported()),
        }
    }

    fn matches(&self, doc: &Json) -> bool {
        match self {
            Self::All => true,
            Self::Match { field, terms } => doc
                .get(*field)
                .and_then(Json::as_str)
                .map(str::to_lowercase)
                .is_some_and(|text| terms.iter().any(|t| text.contains(t.as_str()))),
            Self::Term { field, value } => doc.get(*field) == Some(*value),
        }
    }
}

#[async_trait]
impl SearchIndex for MemSearchIndex {
    async fn index(&self, index: &str, id: &str, doc: Json) -> Result<(), Error> {
        validate_key(id)?;
        self.indices
            .write()
            .map_err(poisoned)?
            .entry(index.to_owned())
            .or_default()
            .insert(id.to_owned(), doc);
        Ok(())
    }

    async fn search(&self, index: &str, query: &Json) -> Result<Vec<Json>, Error> {
        let matcher = Matcher::parse(query)?;
        let size = query
            .get("size")
            .and_then(Json::as_u64)
            .map_or(usize::MAX, |s| s as usize);

        let indices = self.indices.read().map_err(poisoned)?;
        Ok(indices
            .get(index)
            .map(|docs| {
                docs.values()
                    .filter(|d| matcher.matches(d))
                    .take(size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), Error> {
        if let Some(docs) = self.indices.write().map_err(poisoned)?.get_mut(index) {
            docs.remove(id);
        }
        Ok(())
    }
}
